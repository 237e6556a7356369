//! Evaluation context and calendar windows

use autopatch_types::{SimulationResult, VersionComparison};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde_json::{json, Map, Value};

/// Monday–Friday, 09:00–17:00 UTC
pub fn in_business_hours(at: DateTime<Utc>) -> bool {
    !matches!(at.weekday(), Weekday::Sat | Weekday::Sun) && (9..17).contains(&at.hour())
}

/// Sunday 02:00–06:00 UTC
pub fn in_maintenance_window(at: DateTime<Utc>) -> bool {
    at.weekday() == Weekday::Sun && (2..6).contains(&at.hour())
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Flat key/value context the policy conditions are matched against.
pub fn build_context(
    comparison: &VersionComparison,
    simulation: &SimulationResult,
    now: DateTime<Utc>,
) -> Map<String, Value> {
    let context = json!({
        "component": comparison.component,
        "version": comparison.available_version,
        "priority": comparison.priority.as_str(),
        "breaking_changes": comparison.breaking_changes,
        "version_distance": comparison.version_distance,
        "simulation_status": simulation.status.to_string(),
        "simulation_success_rate": simulation.success_rate(),
        "tests_failed": simulation.tests_failed,
        "error_count": simulation.errors.len(),
        "warning_count": simulation.warnings.len(),
        "performance_degradation": simulation.performance_degradation,
        "in_business_hours": in_business_hours(now),
        "in_maintenance_window": in_maintenance_window(now),
        "hour_utc": now.hour(),
        "weekday": weekday_name(now.weekday()),
    });
    match context {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
