//! Cron resolver (spec.md §4.5).
//!
//! Pure: never touches the Store or the wall clock. Given a non-empty set
//! of cron expressions and an optional `[start, end]` validity window,
//! computes the minimum next fire-time strictly after an anchor instant.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("cron expression set must not be empty")]
    EmptyExpressionSet,

    #[error("invalid cron expression '{expr}': {source}")]
    InvalidExpression {
        expr: String,
        #[source]
        source: cron::error::Error,
    },
}

/// Parse a 5-field (minute hour day-of-month month day-of-week) cron
/// expression. The `cron` crate requires a leading seconds field; we pin it
/// to `0` the same way the rest of the retrieval pack does when accepting
/// standard 5-field crontab syntax.
fn parse(expr: &str) -> Result<Schedule, CronError> {
    let field_count = expr.split_whitespace().count();
    let with_seconds = if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&with_seconds).map_err(|source| CronError::InvalidExpression {
        expr: expr.to_string(),
        source,
    })
}

/// Compute the minimum next fire-time at or after `anchor`, across every
/// expression in `crons`, constrained to `[start, end]` if given.
///
/// Returns `Ok(None)` iff no expression yields a fire-time within the
/// window — in particular, an `end < start` window always resolves to
/// `None` regardless of anchor.
pub fn next_after(
    crons: &[String],
    anchor: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, CronError> {
    if crons.is_empty() {
        return Err(CronError::EmptyExpressionSet);
    }

    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Ok(None);
        }
    }

    // `Schedule::after` yields times strictly after its argument, so to
    // find the earliest fire-time >= start we seed the search one instant
    // before the window opens.
    let effective_anchor = match start {
        Some(start) if start > anchor => start - Duration::nanoseconds(1),
        _ => anchor,
    };

    let mut best: Option<DateTime<Utc>> = None;
    for expr in crons {
        let schedule = parse(expr)?;
        if let Some(candidate) = schedule.after(&effective_anchor).next() {
            best = Some(match best {
                Some(current) if current <= candidate => current,
                _ => candidate,
            });
        }
    }

    Ok(best.filter(|fire| end.map(|end| *fire <= end).unwrap_or(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(s: &str) -> DateTime<Utc> {
        Utc.datetime_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn tie_break_picks_earliest_across_expressions() {
        let crons = vec!["*/2 * * * *".to_string(), "*/3 * * * *".to_string()];
        let anchor = dt("2024-01-01T12:00:30");
        let next = next_after(&crons, anchor, None, None).unwrap().unwrap();
        assert_eq!(next, dt("2024-01-01T12:02:00"));
    }

    #[test]
    fn end_before_start_is_always_none() {
        let crons = vec!["* * * * *".to_string()];
        let anchor = dt("2024-01-01T12:00:00");
        let start = dt("2024-01-02T00:00:00");
        let end = dt("2024-01-01T00:00:00");
        assert!(next_after(&crons, anchor, Some(start), Some(end))
            .unwrap()
            .is_none());
    }

    #[test]
    fn start_in_the_future_clamps_the_first_fire() {
        let crons = vec!["*/5 * * * *".to_string()];
        let anchor = dt("2024-01-01T12:00:00");
        let start = dt("2024-01-01T12:07:00");
        let next = next_after(&crons, anchor, Some(start), None)
            .unwrap()
            .unwrap();
        assert_eq!(next, dt("2024-01-01T12:10:00"));
    }

    #[test]
    fn empty_expression_set_is_rejected() {
        assert!(matches!(
            next_after(&[], Utc::now(), None, None),
            Err(CronError::EmptyExpressionSet)
        ));
    }

    #[test]
    fn missed_max_delay_scenario_resolves_next_fire_at_five_past() {
        // spec.md §8 scenario 4: cron */5, schedule fired at 12:00, the
        // next schedule placed after a timeout must land on 12:05.
        let crons = vec!["*/5 * * * *".to_string()];
        let anchor = dt("2024-01-01T12:02:00");
        let next = next_after(&crons, anchor, None, None).unwrap().unwrap();
        assert_eq!(next, dt("2024-01-01T12:05:00"));
    }
}
