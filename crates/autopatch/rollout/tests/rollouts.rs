//! Strategy traces, rollback and stuck detection under paused time

use autopatch_rollout::{
    HealthMetrics, RecordingTrafficController, RolloutConfig, RolloutController,
    RolloutControllerConfig, RolloutError, RolloutId, RolloutPhase, RolloutStatus,
    RolloutStrategy, StaticMetricsProvider,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

fn controller(
    traffic: Arc<RecordingTrafficController>,
    metrics: StaticMetricsProvider,
) -> Arc<RolloutController> {
    Arc::new(RolloutController::new(
        RolloutControllerConfig::default(),
        traffic,
        Arc::new(metrics),
    ))
}

fn quick(mut config: RolloutConfig) -> RolloutConfig {
    config.monitoring_duration_seconds = 60;
    config.health_check_interval = 30;
    config
}

async fn wait_terminal(controller: &RolloutController, id: &RolloutId) -> RolloutStatus {
    for _ in 0..10_000 {
        if let Some(status) = controller.get_rollout(id).await {
            if status.is_terminal() {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("rollout {id} never finished");
}

fn non_decreasing(values: &[u8]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

#[tokio::test(start_paused = true)]
async fn healthy_rolling_update_reaches_full_traffic() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(traffic.clone(), StaticMetricsProvider::healthy());

    let status = controller
        .start_rollout("svc", "1.1.0", quick(RolloutConfig::rolling_update()))
        .unwrap();
    assert_eq!(status.phase, RolloutPhase::Preparing);

    let done = wait_terminal(&controller, &status.id).await;
    assert_eq!(done.phase, RolloutPhase::Complete);
    assert_eq!(done.current_percentage, 100);
    assert_eq!(done.samples_taken, 10);
    assert!(!done.rollback_triggered);

    let shifts = traffic.percentages("svc").await;
    assert_eq!(shifts, vec![20, 40, 60, 80, 100]);
    assert!(non_decreasing(&shifts));
}

#[tokio::test(start_paused = true)]
async fn unhealthy_canary_rolls_back_without_promotion() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(
        traffic.clone(),
        StaticMetricsProvider::new(HealthMetrics::new(0.2, 90.0)),
    );

    let status = controller
        .start_rollout("svc", "1.1.0", quick(RolloutConfig::default()))
        .unwrap();
    let done = wait_terminal(&controller, &status.id).await;

    assert_eq!(done.phase, RolloutPhase::Failed);
    assert!(done.rollback_triggered);
    assert_eq!(done.current_percentage, 0);
    assert!(done.errors[0].contains("unhealthy at 10%"));
    let shifts = traffic.percentages("svc").await;
    assert_eq!(shifts, vec![10, 0]);
    assert!(!shifts.contains(&100));
}

#[tokio::test(start_paused = true)]
async fn rolling_step_breach_walks_back_in_twenty_point_steps() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(
        traffic.clone(),
        StaticMetricsProvider::healthy().degrading_at(60, HealthMetrics::new(0.3, 90.0)),
    );

    let status = controller
        .start_rollout("svc", "2.0.0", quick(RolloutConfig::rolling_update()))
        .unwrap();
    let done = wait_terminal(&controller, &status.id).await;

    assert_eq!(done.phase, RolloutPhase::Failed);
    assert!(done.rollback_triggered);
    assert_eq!(traffic.percentages("svc").await, vec![20, 40, 60, 40, 20, 0]);
}

#[tokio::test(start_paused = true)]
async fn disabled_rollback_fails_in_place() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(
        traffic.clone(),
        StaticMetricsProvider::new(HealthMetrics::new(0.2, 90.0)),
    );
    let mut config = quick(RolloutConfig::default());
    config.rollback_enabled = false;

    let status = controller.start_rollout("svc", "1.1.0", config).unwrap();
    let done = wait_terminal(&controller, &status.id).await;

    assert_eq!(done.phase, RolloutPhase::Failed);
    assert!(!done.rollback_triggered);
    assert_eq!(done.current_percentage, 10);
    assert_eq!(done.errors.len(), 1);
    assert_eq!(traffic.percentages("svc").await, vec![10]);
}

#[tokio::test(start_paused = true)]
async fn slow_responses_breach_the_ceiling() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(
        traffic.clone(),
        StaticMetricsProvider::new(HealthMetrics::new(0.0, 800.0)),
    );
    let mut config = quick(RolloutConfig::default());
    config.strategy = RolloutStrategy::AllAtOnce;

    let status = controller.start_rollout("svc", "1.1.0", config).unwrap();
    let done = wait_terminal(&controller, &status.id).await;

    assert_eq!(done.phase, RolloutPhase::Failed);
    assert!(done.errors[0].contains("response time"));
    assert_eq!(traffic.percentages("svc").await, vec![100, 80, 60, 40, 20, 0]);
}

#[tokio::test(start_paused = true)]
async fn blue_green_switches_after_marker() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(traffic.clone(), StaticMetricsProvider::healthy());

    let status = controller
        .start_rollout("svc", "1.1.0", RolloutConfig::fast_blue_green())
        .unwrap();
    let done = wait_terminal(&controller, &status.id).await;

    assert!(done.is_complete());
    assert_eq!(done.samples_taken, 12);
    assert_eq!(traffic.percentages("svc").await, vec![50, 100]);
}

#[tokio::test(start_paused = true)]
async fn failed_traffic_shift_triggers_rollback() {
    let traffic = Arc::new(RecordingTrafficController::new().with_failure_at(100));
    let controller = controller(traffic.clone(), StaticMetricsProvider::healthy());

    let status = controller
        .start_rollout("svc", "1.1.0", RolloutConfig::fast_blue_green())
        .unwrap();
    let done = wait_terminal(&controller, &status.id).await;

    assert_eq!(done.phase, RolloutPhase::Failed);
    assert!(done.rollback_triggered);
    assert!(done.errors[0].contains("traffic shift to 100% failed"));
    assert_eq!(traffic.percentages("svc").await, vec![50, 30, 10, 0]);
}

#[tokio::test(start_paused = true)]
async fn stuck_rollouts_are_force_failed() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(traffic, StaticMetricsProvider::healthy());
    let mut config = RolloutConfig::rolling_update();
    config.monitoring_duration_seconds = 100_000;
    config.health_check_interval = 50_000;

    let status = controller.start_rollout("svc", "1.1.0", config).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(controller.detect_stuck_rollouts().await.is_empty());
    let stuck = controller
        .detect_stuck_rollouts_at(Utc::now() + chrono::Duration::seconds(601))
        .await;
    assert_eq!(stuck, vec![status.id]);

    let failed = controller.get_rollout(&status.id).await.unwrap();
    assert_eq!(failed.phase, RolloutPhase::Failed);
    assert!(failed.errors.iter().any(|e| e.contains("stuck")));
    assert!(controller.active_rollouts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_in_flight_rollouts() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(traffic, StaticMetricsProvider::healthy());
    controller.start().await.unwrap();
    assert!(matches!(
        controller.start().await,
        Err(RolloutError::AlreadyRunning)
    ));

    let mut config = RolloutConfig::cautious_canary();
    config.monitoring_duration_seconds = 3_600;
    let status = controller.start_rollout("svc", "1.1.0", config).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    controller.stop().await;
    assert!(!controller.is_running().await);
    let interrupted = controller.get_rollout(&status.id).await.unwrap();
    assert_eq!(interrupted.phase, RolloutPhase::Failed);
    assert!(interrupted.errors.iter().any(|e| e.contains("interrupted")));

    assert!(matches!(
        controller.start_rollout("svc", "1.1.1", RolloutConfig::default()),
        Err(RolloutError::ShuttingDown)
    ));
    controller.start().await.unwrap();
    assert!(controller
        .start_rollout("svc", "1.1.1", quick(RolloutConfig::default()))
        .is_ok());
    controller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn statistics_track_outcomes() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(
        traffic,
        StaticMetricsProvider::healthy().degrading_at(100, HealthMetrics::new(0.03, 90.0)),
    );

    let tolerant = quick(RolloutConfig::rolling_update());
    let mut strict = quick(RolloutConfig::default());
    strict.error_threshold = 0.01;

    let ok = controller.start_rollout("a", "1.0.1", tolerant).unwrap();
    let bad = controller.start_rollout("b", "1.0.1", strict).unwrap();
    assert_eq!(controller.statistics().await.active, 2);

    assert!(wait_terminal(&controller, &ok.id).await.is_complete());
    let bad = wait_terminal(&controller, &bad.id).await;
    assert_eq!(bad.phase, RolloutPhase::Failed);
    assert!(bad.rollback_triggered);

    let stats = controller.statistics().await;
    assert_eq!(stats.active, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.rolled_back, 1);
    assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    assert!((stats.rollback_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(controller.history().await.len(), 2);
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let traffic = Arc::new(RecordingTrafficController::new());
    let controller = controller(traffic, StaticMetricsProvider::healthy());
    let mut config = RolloutConfig::default();
    config.progressive_steps = vec![50, 10];

    assert!(matches!(
        controller.start_rollout("svc", "1.1.0", config),
        Err(RolloutError::InvalidConfig(_))
    ));
    assert!(controller.active_rollouts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn history_keeps_only_the_newest_rollouts() {
    let controller = Arc::new(RolloutController::new(
        RolloutControllerConfig {
            history_limit: 2,
            ..RolloutControllerConfig::default()
        },
        Arc::new(RecordingTrafficController::new()),
        Arc::new(StaticMetricsProvider::healthy()),
    ));

    let mut ids = Vec::new();
    for version in ["1.0.1", "1.0.2", "1.0.3"] {
        let started = controller
            .start_rollout("svc", version, RolloutConfig::fast_blue_green())
            .unwrap();
        assert!(wait_terminal(&controller, &started.id).await.is_complete());
        ids.push(started.id);
    }

    let history: Vec<RolloutId> = controller.history().await.iter().map(|s| s.id).collect();
    assert_eq!(history, ids[1..].to_vec());
    assert!(controller.get_rollout(&ids[0]).await.is_none());
    assert_eq!(controller.statistics().await.completed, 2);
}
