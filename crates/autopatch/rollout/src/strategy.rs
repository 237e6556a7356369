//! Traffic plans per rollout strategy

use crate::error::{Result, RolloutError};
use autopatch_types::{RolloutConfig, RolloutStrategy};

/// Percentage points removed per rollback step
pub const ROLLBACK_STEP: u8 = 20;

/// Blue-green stands the green environment up at this marker before the switch
const BLUE_GREEN_MARKER: u8 = 50;

/// Traffic percentages a rollout visits, in order, each followed by a
/// monitoring period. Every plan ends at 100.
pub fn deployment_plan(config: &RolloutConfig) -> Result<Vec<u8>> {
    validate(config)?;

    let mut plan = match config.strategy {
        RolloutStrategy::AllAtOnce => vec![100],
        RolloutStrategy::BlueGreen => vec![BLUE_GREEN_MARKER, 100],
        RolloutStrategy::Canary => {
            let canary = config.canary_percentage;
            let mut plan: Vec<u8> = if canary > 0 { vec![canary] } else { Vec::new() };
            plan.extend(config.progressive_steps.iter().copied().filter(|s| *s > canary));
            plan
        }
        RolloutStrategy::Rolling => config
            .progressive_steps
            .iter()
            .copied()
            .filter(|s| *s > 0)
            .collect(),
    };

    plan.dedup();
    if plan.last() != Some(&100) {
        plan.push(100);
    }
    Ok(plan)
}

fn validate(config: &RolloutConfig) -> Result<()> {
    if config.canary_percentage > 100 {
        return Err(RolloutError::InvalidConfig(format!(
            "canary percentage {} is above 100",
            config.canary_percentage
        )));
    }
    if let Some(step) = config.progressive_steps.iter().find(|s| **s > 100) {
        return Err(RolloutError::InvalidConfig(format!(
            "progressive step {step} is above 100"
        )));
    }
    if config.progressive_steps.windows(2).any(|w| w[1] < w[0]) {
        return Err(RolloutError::InvalidConfig(
            "progressive steps must not decrease".to_string(),
        ));
    }
    if config.health_check_interval == 0 {
        return Err(RolloutError::InvalidConfig(
            "health check interval must be at least one second".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.error_threshold) {
        return Err(RolloutError::InvalidConfig(format!(
            "error threshold {} is outside 0.0..=1.0",
            config.error_threshold
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: RolloutStrategy, canary: u8, steps: Vec<u8>) -> RolloutConfig {
        RolloutConfig {
            strategy,
            canary_percentage: canary,
            progressive_steps: steps,
            ..RolloutConfig::default()
        }
    }

    #[test]
    fn plans_per_strategy() {
        assert_eq!(
            deployment_plan(&config(RolloutStrategy::AllAtOnce, 10, vec![10, 50])).unwrap(),
            vec![100]
        );
        assert_eq!(
            deployment_plan(&RolloutConfig::fast_blue_green()).unwrap(),
            vec![50, 100]
        );
        assert_eq!(
            deployment_plan(&RolloutConfig::rolling_update()).unwrap(),
            vec![20, 40, 60, 80, 100]
        );
        assert_eq!(
            deployment_plan(&RolloutConfig::cautious_canary()).unwrap(),
            vec![5, 25, 50, 100]
        );
    }

    #[test]
    fn canary_promotes_through_steps_above_canary() {
        assert_eq!(
            deployment_plan(&config(RolloutStrategy::Canary, 30, vec![10, 25, 50, 75])).unwrap(),
            vec![30, 50, 75, 100]
        );
        assert_eq!(
            deployment_plan(&config(RolloutStrategy::Canary, 10, Vec::new())).unwrap(),
            vec![10, 100]
        );
    }

    #[test]
    fn rolling_without_final_step_still_finishes() {
        assert_eq!(
            deployment_plan(&config(RolloutStrategy::Rolling, 0, vec![0, 30, 30, 60])).unwrap(),
            vec![30, 60, 100]
        );
        assert_eq!(
            deployment_plan(&config(RolloutStrategy::Rolling, 0, Vec::new())).unwrap(),
            vec![100]
        );
    }

    #[test]
    fn rejects_invalid_configs() {
        assert!(deployment_plan(&config(RolloutStrategy::Canary, 120, Vec::new())).is_err());
        assert!(deployment_plan(&config(RolloutStrategy::Rolling, 0, vec![50, 20])).is_err());
        assert!(deployment_plan(&config(RolloutStrategy::Rolling, 0, vec![50, 150])).is_err());
        let mut zero_interval = RolloutConfig::default();
        zero_interval.health_check_interval = 0;
        assert!(deployment_plan(&zero_interval).is_err());
        let mut bad_threshold = RolloutConfig::default();
        bad_threshold.error_threshold = 1.5;
        assert!(matches!(
            deployment_plan(&bad_threshold),
            Err(RolloutError::InvalidConfig(_))
        ));
    }
}
