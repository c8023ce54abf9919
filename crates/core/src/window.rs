//! Window expressions and their resolution to concrete query ranges.
//!
//! A window is either a point count (`100`) or a duration (`"30 days"`).
//! Resolving a window against an end time yields a [`WindowRange`] that
//! every storage backend applies the same way: inclusive on both ends,
//! results ascending by timestamp.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WindowError;

/// How much history a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowRepr", into = "WindowRepr")]
pub enum Window {
    /// The N most recent points at or before the end time.
    Points(usize),
    /// Everything in `[end - span, end]`.
    Span(Duration),
}

impl Window {
    /// Resolve against `end` into a concrete range.
    pub fn resolve(&self, end: DateTime<Utc>) -> WindowRange {
        match *self {
            Window::Points(limit) => WindowRange::Latest { limit, end },
            Window::Span(span) => WindowRange::Between {
                start: end.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
                end,
            },
        }
    }
}

impl FromStr for Window {
    type Err = WindowError;

    /// A bare integer is a point count; anything else must be a duration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return trimmed
                .parse::<usize>()
                .map(Window::Points)
                .map_err(|_| WindowError::Overflow { expr: s.to_string() });
        }
        parse_duration(s).map(Window::Span)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Points(n) => write!(f, "{n}"),
            Window::Span(span) => f.write_str(&format_duration(*span)),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WindowRepr {
    Points(u64),
    Expr(String),
}

impl TryFrom<WindowRepr> for Window {
    type Error = WindowError;

    fn try_from(repr: WindowRepr) -> Result<Self, Self::Error> {
        match repr {
            WindowRepr::Points(n) => usize::try_from(n)
                .map(Window::Points)
                .map_err(|_| WindowError::Overflow { expr: n.to_string() }),
            WindowRepr::Expr(expr) => parse_duration(&expr).map(Window::Span),
        }
    }
}

impl From<Window> for WindowRepr {
    fn from(window: Window) -> Self {
        match window {
            Window::Points(n) => WindowRepr::Points(n as u64),
            Window::Span(span) => WindowRepr::Expr(format_duration(span)),
        }
    }
}

// ── Resolved ranges ─────────────────────────────────────────────────

/// A window resolved against an end time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRange {
    Latest { limit: usize, end: DateTime<Utc> },
    Between { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl WindowRange {
    pub fn end(&self) -> DateTime<Utc> {
        match *self {
            WindowRange::Latest { end, .. } | WindowRange::Between { end, .. } => end,
        }
    }

    /// Whether `ts` passes the time bounds (the point limit is not considered).
    pub fn admits(&self, ts: DateTime<Utc>) -> bool {
        match *self {
            WindowRange::Latest { end, .. } => ts <= end,
            WindowRange::Between { start, end } => start <= ts && ts <= end,
        }
    }

    /// Apply the range to an in-memory collection, returning matches ascending.
    pub fn select<T, F>(&self, items: &[T], ts_of: F) -> Vec<T>
    where
        T: Clone,
        F: Fn(&T) -> DateTime<Utc>,
    {
        let mut selected: Vec<T> = items
            .iter()
            .filter(|item| self.admits(ts_of(item)))
            .cloned()
            .collect();
        selected.sort_by_key(|item| ts_of(item));

        if let WindowRange::Latest { limit, .. } = *self {
            let skip = selected.len().saturating_sub(limit);
            selected.drain(..skip);
        }
        selected
    }
}

// ── Duration expressions ────────────────────────────────────────────

/// Parse `"<amount> <unit>"` into a duration.
///
/// Units: second, minute, hour, day, week, each with an optional trailing
/// `s`. Case and surrounding whitespace are ignored.
pub fn parse_duration(expr: &str) -> Result<Duration, WindowError> {
    let normalized = expr.trim().to_lowercase();
    let parts: Vec<&str> = normalized.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(WindowError::Format {
            expr: expr.to_string(),
        });
    }

    let amount: u64 = parts[0].parse().map_err(|_| WindowError::Amount {
        expr: expr.to_string(),
    })?;

    let unit = parts[1].strip_suffix('s').unwrap_or(parts[1]);
    let unit_secs: u64 = match unit {
        "second" => 1,
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        _ => {
            return Err(WindowError::Unit {
                expr: expr.to_string(),
                unit: parts[1].to_string(),
            })
        }
    };

    amount
        .checked_mul(unit_secs)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(Duration::try_seconds)
        .ok_or_else(|| WindowError::Overflow {
            expr: expr.to_string(),
        })
}

/// Render a duration in the largest unit that divides it evenly.
pub fn format_duration(span: Duration) -> String {
    let secs = span.num_seconds();
    let (amount, unit) = [(604_800, "week"), (86_400, "day"), (3_600, "hour"), (60, "minute")]
        .into_iter()
        .find(|(size, _)| secs != 0 && secs % size == 0)
        .map(|(size, unit)| (secs / size, unit))
        .unwrap_or((secs, "second"));

    if amount == 1 {
        format!("{amount} {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parses_units_with_and_without_plural() {
        assert_eq!(parse_duration("30 days").unwrap(), Duration::days(30));
        assert_eq!(parse_duration("1 day").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("10 minutes").unwrap(), Duration::minutes(10));
        assert_eq!(parse_duration("2 weeks").unwrap(), Duration::weeks(2));
        assert_eq!(parse_duration("45 second").unwrap(), Duration::seconds(45));
        assert_eq!(parse_duration("  3 HOURS ").unwrap(), Duration::hours(3));
    }

    #[test]
    fn rejects_unknown_unit_naming_expression() {
        let err = parse_duration("10 fortnights").unwrap_err();
        assert!(matches!(err, WindowError::Unit { .. }));
        assert!(err.to_string().contains("10 fortnights"));
    }

    #[test]
    fn rejects_bad_token_count_and_amounts() {
        assert!(matches!(parse_duration("10"), Err(WindowError::Format { .. })));
        assert!(matches!(parse_duration("10 big days"), Err(WindowError::Format { .. })));
        assert!(matches!(parse_duration("-5 days"), Err(WindowError::Amount { .. })));
        assert!(matches!(parse_duration("1.5 hours"), Err(WindowError::Amount { .. })));
        assert!(matches!(
            parse_duration("99999999999999999 weeks"),
            Err(WindowError::Overflow { .. })
        ));
    }

    #[test]
    fn window_from_yaml_integer_and_string() {
        let points: Window = serde_json::from_value(serde_json::json!(100)).unwrap();
        assert_eq!(points, Window::Points(100));

        let span: Window = serde_json::from_value(serde_json::json!("30 days")).unwrap();
        assert_eq!(span, Window::Span(Duration::days(30)));

        assert!(serde_json::from_value::<Window>(serde_json::json!("10 fortnights")).is_err());
    }

    #[test]
    fn window_from_str_accepts_bare_integers() {
        assert_eq!("25".parse::<Window>().unwrap(), Window::Points(25));
        assert_eq!("6 hours".parse::<Window>().unwrap(), Window::Span(Duration::hours(6)));
    }

    #[test]
    fn display_uses_largest_even_unit() {
        assert_eq!(Window::Span(Duration::days(14)).to_string(), "2 weeks");
        assert_eq!(Window::Span(Duration::minutes(90)).to_string(), "90 minutes");
        assert_eq!(Window::Span(Duration::hours(1)).to_string(), "1 hour");
        assert_eq!(Window::Points(7).to_string(), "7");
    }

    // -- Resolution -------------------------------------------------------

    #[test]
    fn duration_window_resolves_to_inclusive_range() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let range = Window::Span(Duration::days(30)).resolve(end);
        assert_eq!(
            range,
            WindowRange::Between {
                start: Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
                end,
            }
        );
        assert!(range.admits(end));
        assert!(range.admits(Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap()));
    }

    #[test]
    fn point_window_resolves_to_latest() {
        let end = at(12, 0);
        assert_eq!(
            Window::Points(100).resolve(end),
            WindowRange::Latest { limit: 100, end }
        );
    }

    #[test]
    fn select_latest_keeps_most_recent_ascending() {
        let items = vec![at(10, 30), at(10, 0), at(11, 0), at(12, 0), at(12, 30)];
        let picked = Window::Points(2).resolve(at(12, 0)).select(&items, |t| *t);
        assert_eq!(picked, vec![at(11, 0), at(12, 0)]);
    }

    #[test]
    fn select_between_is_inclusive_and_sorted() {
        let items = vec![at(12, 0), at(9, 59), at(10, 0), at(11, 0), at(12, 1)];
        let picked = Window::Span(Duration::hours(2))
            .resolve(at(12, 0))
            .select(&items, |t| *t);
        assert_eq!(picked, vec![at(10, 0), at(11, 0), at(12, 0)]);
    }
}
