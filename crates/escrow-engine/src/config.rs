//! Engine configuration.

use escrow_split::{ResidualPolicy, SplitConfig};

/// Engine-wide policy knobs.
///
/// Constructed explicitly and passed to [`EscrowEngine::new`]
/// (crate::EscrowEngine::new); there is no process-wide configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Where split truncation residuals go.
    pub residual_policy: ResidualPolicy,
    /// Advisory dispute resolution window, in days from opening.
    pub dispute_window_days: i64,
    /// Recipient table limits.
    pub split: SplitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            residual_policy: ResidualPolicy::AssignToFirst,
            dispute_window_days: 14,
            split: SplitConfig::default(),
        }
    }
}
