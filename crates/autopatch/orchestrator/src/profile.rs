//! Rollout profile selection

use autopatch_types::{RiskLevel, RolloutConfig, UpdatePriority};

/// Pick a rollout profile from update priority and assessed risk.
///
/// Critical low-risk fixes go out blue-green; risky updates take the
/// cautious canary; everything else rolls in five steps.
pub fn select_rollout_profile(priority: UpdatePriority, risk: RiskLevel) -> RolloutConfig {
    match (priority, risk) {
        (UpdatePriority::Critical, RiskLevel::Low) => RolloutConfig::fast_blue_green(),
        (_, RiskLevel::High | RiskLevel::Critical) => RolloutConfig::cautious_canary(),
        _ => RolloutConfig::rolling_update(),
    }
}
