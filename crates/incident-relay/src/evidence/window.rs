//! Incident and tail windows around the alert trigger.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// A closed time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// RFC 3339 rendering of the start, with a `Z` suffix.
    #[must_use]
    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// RFC 3339 rendering of the end, with a `Z` suffix.
    #[must_use]
    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

/// The two windows derived for one alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncidentWindows {
    /// `incident_time ± window_min`, used for anomalies and container errors
    pub incident: TimeWindow,
    /// `incident_time - pre_min .. incident_time`, used for the tail
    pub tail: TimeWindow,
    pub window_min: u32,
    pub pre_min: u32,
}

impl IncidentWindows {
    /// Derive both windows by plain arithmetic on the trigger instant.
    ///
    /// Nothing is clamped to the current time: a window reaching into the
    /// future just yields no log entries for that part. Returns `None` when a
    /// bound falls outside the representable range.
    #[must_use]
    pub fn compute(incident_time: DateTime<Utc>, window_min: u32, pre_min: u32) -> Option<Self> {
        let half = Duration::minutes(i64::from(window_min));
        let pre = Duration::minutes(i64::from(pre_min));
        Some(Self {
            incident: TimeWindow {
                start: incident_time.checked_sub_signed(half)?,
                end: incident_time.checked_add_signed(half)?,
            },
            tail: TimeWindow {
                start: incident_time.checked_sub_signed(pre)?,
                end: incident_time,
            },
            window_min,
            pre_min,
        })
    }

    /// The trigger instant the windows were derived from.
    #[must_use]
    pub fn incident_time(&self) -> DateTime<Utc> {
        self.tail.end
    }
}
