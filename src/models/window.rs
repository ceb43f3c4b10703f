//! # Extraction Window
//!
//! Time range over which execution-timestamped records are pulled in one
//! invocation. Both bounds are inclusive; an absent bound is unbounded.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SourceReadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractionWindow {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl ExtractionWindow {
    /// Build a window, rejecting `start > end`
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, SourceReadError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(SourceReadError::InvalidWindow { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Window with no bounds on either side
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `[execution_timestamp - lookback, execution_timestamp]`
    pub fn trailing(execution_timestamp: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            start: Some(execution_timestamp - lookback),
            end: Some(execution_timestamp),
        }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Inclusive membership test matching the source query filter
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| timestamp >= start)
            && self.end.map_or(true, |end| timestamp <= end)
    }
}

impl fmt::Display for ExtractionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |value: Option<DateTime<Utc>>| {
            value.map_or_else(|| "unbounded".to_string(), |ts| ts.to_rfc3339())
        };
        write!(f, "[{}, {}]", bound(self.start), bound(self.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn bounds_are_inclusive() {
        let window = ExtractionWindow::new(Some(ts(1)), Some(ts(5))).unwrap();
        assert!(window.contains(ts(1)));
        assert!(window.contains(ts(5)));
        assert!(!window.contains(ts(0)));
        assert!(!window.contains(ts(6)));
    }

    #[test]
    fn missing_bounds_are_unbounded() {
        let open_start = ExtractionWindow::new(None, Some(ts(5))).unwrap();
        assert!(open_start.contains(ts(0)));
        assert!(ExtractionWindow::unbounded().contains(ts(23)));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = ExtractionWindow::new(Some(ts(5)), Some(ts(1))).unwrap_err();
        assert!(matches!(err, SourceReadError::InvalidWindow { .. }));
    }

    #[test]
    fn trailing_window_spans_lookback() {
        let window = ExtractionWindow::trailing(ts(12), Duration::days(1));
        assert_eq!(window.end(), Some(ts(12)));
        assert_eq!(window.start(), Some(ts(12) - Duration::days(1)));
        assert_eq!(
            window.to_string(),
            "[2024-03-09T12:00:00+00:00, 2024-03-10T12:00:00+00:00]"
        );
    }
}
