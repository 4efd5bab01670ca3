//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunable policy for a [`ChamaEngine`](crate::ChamaEngine) instance.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Member cap applied when a group spec does not set one.
    pub default_max_members: u32,
    /// Cross-round fairness policy. Off by default: winner fairness
    /// across rounds is a caller-side decision, and the engine only
    /// enforces "cannot re-win the same still-active round". When
    /// enabled, a past winner cannot be selected again while another
    /// active member has never won.
    pub unique_winners: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_members: 30,
            unique_winners: false,
        }
    }
}
