//! Chama domain types
//!
//! Shared vocabulary for the group financial rotation and loan lifecycle
//! engine: groups, memberships, contributions, merry-go-round rounds,
//! loans, money arithmetic, and the error taxonomy.
//!
//! These are data structures, not execution engines. The component crates
//! (`chama-membership`, `chama-ledger`, `chama-rotation`, `chama-loans`)
//! own the state machines; `chama-engine` wires them together.

#![deny(unsafe_code)]

pub mod contribution;
pub mod error;
pub mod event;
pub mod group;
pub mod loan;
pub mod member;
pub mod money;
pub mod rotation;

pub use contribution::{
    Contribution, ContributionId, ContributionKind, ContributionSplit, PaymentStatus,
};
pub use error::{ChamaError, ChamaResult};
pub use event::{PayoutEvent, PayoutSource};
pub use group::{Frequency, Group, GroupId, GroupSpec, GroupUpdate};
pub use loan::{Loan, LoanDecision, LoanId, LoanStatus, RepaymentSchedule};
pub use member::{Capability, Membership, PrincipalId, Role};
pub use money::{Amount, InterestRate};
pub use rotation::{Round, RoundId, RoundStatus, SelectionMethod};
