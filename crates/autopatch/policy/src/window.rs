//! Deployment windows for approved updates

use crate::context::{in_business_hours, in_maintenance_window};
use autopatch_types::{DeploymentWindow, UpdatePriority, WindowKind};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};

const BUSINESS_START: i64 = 9;
const BUSINESS_END: i64 = 17;
const MAINTENANCE_START: i64 = 2;
const MAINTENANCE_END: i64 = 6;

fn at_hour(date: NaiveDate, hour: i64) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default())) + Duration::hours(hour)
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Window for an approved update of the given priority: critical updates
/// get an immediate one-hour window, high priority the next business-hours
/// window, everything else the next Sunday maintenance window.
pub fn deployment_window(priority: UpdatePriority, now: DateTime<Utc>) -> DeploymentWindow {
    match priority {
        UpdatePriority::Critical => DeploymentWindow {
            kind: WindowKind::Immediate,
            start: now,
            end: now + Duration::hours(1),
        },
        UpdatePriority::High => next_business_window(now),
        UpdatePriority::Medium | UpdatePriority::Low => next_maintenance_window(now),
    }
}

pub fn next_business_window(now: DateTime<Utc>) -> DeploymentWindow {
    let today = now.date_naive();
    if in_business_hours(now) {
        return DeploymentWindow {
            kind: WindowKind::BusinessHours,
            start: now,
            end: at_hour(today, BUSINESS_END),
        };
    }

    let mut date = if is_weekday(today) && i64::from(now.hour()) < BUSINESS_START {
        today
    } else {
        today + Duration::days(1)
    };
    while !is_weekday(date) {
        date += Duration::days(1);
    }
    DeploymentWindow {
        kind: WindowKind::BusinessHours,
        start: at_hour(date, BUSINESS_START),
        end: at_hour(date, BUSINESS_END),
    }
}

pub fn next_maintenance_window(now: DateTime<Utc>) -> DeploymentWindow {
    let today = now.date_naive();
    if in_maintenance_window(now) {
        return DeploymentWindow {
            kind: WindowKind::Maintenance,
            start: now,
            end: at_hour(today, MAINTENANCE_END),
        };
    }

    let mut days_ahead = i64::from((7 - now.weekday().num_days_from_sunday()) % 7);
    if days_ahead == 0 && i64::from(now.hour()) >= MAINTENANCE_END {
        days_ahead = 7;
    }
    let date = today + Duration::days(days_ahead);
    DeploymentWindow {
        kind: WindowKind::Maintenance,
        start: at_hour(date, MAINTENANCE_START),
        end: at_hour(date, MAINTENANCE_END),
    }
}
