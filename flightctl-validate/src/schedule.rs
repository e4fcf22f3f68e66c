//! `UpdateSchedule` validation (§4.8): a 5-field cron expression, a valid
//! IANA time zone (or `Local`/`UTC`/`GMT`), and a `startGraceDuration` that
//! fits inside the shortest gap between the schedule's next five firings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use flightctl_types::rollout::UpdateSchedule;

use crate::ValidationError;

/// The `cron` crate's `Schedule` parser expects a leading seconds field;
/// the data model's `cronExpression` is the conventional 5-field form
/// (minute hour day month weekday), so a `"0 "` prefix adapts one to the
/// other without exposing that detail to callers.
fn to_six_field(expr: &str) -> String {
    format!("0 {expr}")
}

fn known_timezone_alias(tz: &str) -> bool {
    matches!(tz, "Local" | "UTC" | "GMT")
}

pub fn validate_update_schedule(schedule: &UpdateSchedule, now: DateTime<Utc>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let parsed = Schedule::from_str(&to_six_field(&schedule.cron_expression));
    let parsed = match parsed {
        Ok(p) => Some(p),
        Err(e) => {
            errors.push(ValidationError::new("spec.rolloutPolicy.updateSchedule.cronExpression", e.to_string()));
            None
        }
    };

    if !known_timezone_alias(&schedule.time_zone) && schedule.time_zone.parse::<chrono_tz::Tz>().is_err() {
        errors.push(ValidationError::new(
            "spec.rolloutPolicy.updateSchedule.timeZone",
            format!("'{}' is not a valid IANA time zone", schedule.time_zone),
        ));
    }

    if let Some(parsed) = parsed {
        let upcoming: Vec<DateTime<Utc>> = parsed.after(&now).take(5).collect();
        if let Some(min_gap) = shortest_gap(&upcoming) {
            if schedule.start_grace_duration_seconds as i64 > min_gap {
                errors.push(ValidationError::new(
                    "spec.rolloutPolicy.updateSchedule.startGraceDuration",
                    "startGraceDuration must be <= the minimum interval between the next 5 cron firings",
                ));
            }
        }
    }

    errors
}

fn shortest_gap(firings: &[DateTime<Utc>]) -> Option<i64> {
    firings
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_seconds())
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn valid_hourly_schedule_with_utc_is_accepted() {
        let schedule = UpdateSchedule {
            cron_expression: "0 * * * *".to_string(),
            time_zone: "UTC".to_string(),
            start_grace_duration_seconds: 60,
        };
        assert!(validate_update_schedule(&schedule, now()).is_empty());
    }

    #[test]
    fn invalid_cron_expression_is_rejected() {
        let schedule = UpdateSchedule {
            cron_expression: "not a cron".to_string(),
            time_zone: "UTC".to_string(),
            start_grace_duration_seconds: 60,
        };
        let errors = validate_update_schedule(&schedule, now());
        assert!(errors.iter().any(|e| e.field.contains("cronExpression")));
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        let schedule = UpdateSchedule {
            cron_expression: "0 * * * *".to_string(),
            time_zone: "Narnia/Cair_Paravel".to_string(),
            start_grace_duration_seconds: 60,
        };
        let errors = validate_update_schedule(&schedule, now());
        assert!(errors.iter().any(|e| e.field.contains("timeZone")));
    }

    #[test]
    fn iana_time_zone_is_accepted() {
        let schedule = UpdateSchedule {
            cron_expression: "0 * * * *".to_string(),
            time_zone: "Europe/Madrid".to_string(),
            start_grace_duration_seconds: 60,
        };
        assert!(validate_update_schedule(&schedule, now()).is_empty());
    }

    #[test]
    fn grace_duration_longer_than_firing_gap_is_rejected() {
        // Hourly firings, 2h grace: exceeds the 1h gap.
        let schedule = UpdateSchedule {
            cron_expression: "0 * * * *".to_string(),
            time_zone: "UTC".to_string(),
            start_grace_duration_seconds: 7200,
        };
        let errors = validate_update_schedule(&schedule, now());
        assert!(errors.iter().any(|e| e.field.contains("startGraceDuration")));
    }
}
