//! Money arithmetic in integer minor units.
//!
//! Monetary values are carried as whole minor units (cents) so that
//! contribution pooling and interest computation never accumulate
//! floating-point drift. Interest rates are held in basis points for the
//! same reason: `1000.00` at `10%` is exactly `1100.00`.

use serde::{Deserialize, Serialize};

/// A monetary amount in minor units (cents).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Create an amount from minor units (cents).
    pub fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Create an amount from major units (whole currency units).
    pub fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(100))
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Raw value in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Amount::saturating_add)
    }
}

/// An interest rate in basis points (1% = 100 bps).
///
/// Loans snapshot the group's rate at creation time; a later change to
/// the group never touches an existing loan.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct InterestRate {
    basis_points: u32,
}

impl InterestRate {
    pub fn from_basis_points(basis_points: u32) -> Self {
        Self { basis_points }
    }

    /// Whole-percent constructor (`from_percent(10)` = 10%).
    pub fn from_percent(percent: u32) -> Self {
        Self {
            basis_points: percent.saturating_mul(100),
        }
    }

    pub fn basis_points(&self) -> u32 {
        self.basis_points
    }

    /// Interest owed on a principal, rounded half up in minor units.
    pub fn interest_on(&self, principal: Amount) -> Amount {
        let raw = principal.0 as i128 * self.basis_points as i128;
        Amount(((raw + 5_000) / 10_000) as i64)
    }

    /// Principal plus interest: `principal × (1 + rate/100)`.
    pub fn total_due(&self, principal: Amount) -> Amount {
        principal.saturating_add(self.interest_on(principal))
    }
}

impl std::fmt::Display for InterestRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02}%",
            self.basis_points / 100,
            self.basis_points % 100
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::from_major(1000).to_string(), "1000.00");
        assert_eq!(Amount::new(50).to_string(), "0.50");
        assert_eq!(Amount::new(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_amount_arithmetic() {
        let a = Amount::from_major(500);
        let b = Amount::new(2_550);
        assert_eq!(a.saturating_add(b), Amount::new(52_550));
        assert_eq!(a.saturating_sub(b), Amount::new(47_450));
        assert!(a.is_positive());
        assert!(Amount::ZERO.is_zero());
    }

    #[test]
    fn test_amount_sum() {
        let total: Amount = [Amount::from_major(1), Amount::from_major(2)]
            .into_iter()
            .sum();
        assert_eq!(total, Amount::from_major(3));
    }

    #[test]
    fn test_total_due_exact() {
        // 1000.00 at 10% = 1100.00, no drift
        let rate = InterestRate::from_percent(10);
        let total = rate.total_due(Amount::from_major(1000));
        assert_eq!(total, Amount::from_major(1100));
        assert_eq!(total.to_string(), "1100.00");
    }

    #[test]
    fn test_total_due_five_percent() {
        // 2000.00 at 5% = 2100.00
        let rate = InterestRate::from_percent(5);
        assert_eq!(
            rate.total_due(Amount::from_major(2000)),
            Amount::from_major(2100)
        );
    }

    #[test]
    fn test_fractional_rate_is_exact_in_minor_units() {
        // 0.12% of 1000.00 = 1.20 exactly
        let rate = InterestRate::from_basis_points(12);
        assert_eq!(rate.interest_on(Amount::from_major(1_000)), Amount::new(120));
        // 1.25% of 100.00 = 1.25 exactly
        let rate = InterestRate::from_basis_points(125);
        assert_eq!(rate.interest_on(Amount::from_major(100)), Amount::new(125));
    }

    #[test]
    fn test_sub_minor_interest_rounds_half_up() {
        // 1.25% of 0.50 = 0.625 minor units -> 1
        let rate = InterestRate::from_basis_points(125);
        assert_eq!(rate.interest_on(Amount::new(50)), Amount::new(1));
        // 1.25% of 0.39 = 0.4875 minor units -> 0
        assert_eq!(rate.interest_on(Amount::new(39)), Amount::new(0));
        // 0.10% of 5.00 = 0.5 minor units exactly -> 1
        let rate = InterestRate::from_basis_points(10);
        assert_eq!(rate.interest_on(Amount::new(500)), Amount::new(1));
    }

    #[test]
    fn test_zero_rate() {
        let rate = InterestRate::default();
        let p = Amount::from_major(750);
        assert_eq!(rate.total_due(p), p);
    }

    proptest! {
        #[test]
        fn prop_total_due_never_below_principal(minor in 0i64..1_000_000_000, bps in 0u32..50_000) {
            let rate = InterestRate::from_basis_points(bps);
            let principal = Amount::new(minor);
            prop_assert!(rate.total_due(principal) >= principal);
        }

        #[test]
        fn prop_whole_percent_on_whole_major_is_exact(major in 0i64..1_000_000, pct in 0u32..100) {
            // Whole percents on whole major amounts never need rounding.
            let rate = InterestRate::from_percent(pct);
            let interest = rate.interest_on(Amount::from_major(major));
            prop_assert_eq!(interest.minor(), major * pct as i64);
        }
    }
}
