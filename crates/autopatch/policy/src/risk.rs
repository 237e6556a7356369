//! Risk scoring

use autopatch_types::{RiskLevel, SimulationResult, SimulationStatus, VersionComparison};

/// Score an update and band the score into a [`RiskLevel`].
///
/// Breaking changes +3, failed simulation +5, any failed test +2, any
/// recorded error +2, more than three warnings +1.
pub fn risk_score(comparison: &VersionComparison, simulation: &SimulationResult) -> (u32, RiskLevel) {
    let mut score = 0;
    if comparison.breaking_changes {
        score += 3;
    }
    if simulation.status == SimulationStatus::Failed {
        score += 5;
    }
    if simulation.tests_failed > 0 {
        score += 2;
    }
    if !simulation.errors.is_empty() {
        score += 2;
    }
    if simulation.warnings.len() > 3 {
        score += 1;
    }
    (score, RiskLevel::from_score(score))
}
