//! Schedule descriptions and their translation into launchd fields.
//!
//! A job fires either every N seconds or on a calendar match, never both.
//! When a description carries both `interval` and `calendar`, the interval
//! wins and the calendar is dropped at parse time.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Calendar match fields. Values are passed to launchd verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Calendar {
    #[serde(default, alias = "Minute", skip_serializing_if = "Option::is_none")]
    pub minute: Option<u8>,
    #[serde(default, alias = "Hour", skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
    #[serde(default, alias = "Day", skip_serializing_if = "Option::is_none")]
    pub day: Option<u8>,
    #[serde(default, alias = "Weekday", skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u8>,
    #[serde(default, alias = "Month", skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
}

impl Calendar {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Present fields as (launchd key, value) pairs in a fixed order.
    pub fn native_entries(&self) -> Vec<(&'static str, u8)> {
        [
            ("Minute", self.minute),
            ("Hour", self.hour),
            ("Day", self.day),
            ("Weekday", self.weekday),
            ("Month", self.month),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Interval(NonZeroU32),
    Calendar(Calendar),
    /// No timed trigger; launchd only starts the job at load if `run_at_load` is set.
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleSpec", into = "ScheduleSpec")]
pub struct Schedule {
    pub trigger: Trigger,
    pub run_at_load: bool,
}

/// Wire shape of a schedule, as typed on the command line and stored in the registry.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    calendar: Option<Calendar>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    run_at_load: bool,
}

impl TryFrom<ScheduleSpec> for Schedule {
    type Error = String;

    fn try_from(spec: ScheduleSpec) -> Result<Self, Self::Error> {
        let trigger = match (spec.interval, spec.calendar) {
            (Some(secs), calendar) => {
                let secs = NonZeroU32::new(secs)
                    .ok_or_else(|| "interval must be a positive number of seconds".to_string())?;
                if calendar.is_some() {
                    tracing::warn!("Both interval and calendar given; calendar ignored");
                }
                Trigger::Interval(secs)
            }
            (None, Some(cal)) if !cal.is_empty() => Trigger::Calendar(cal),
            (None, _) => Trigger::Unset,
        };
        Ok(Self {
            trigger,
            run_at_load: spec.run_at_load,
        })
    }
}

impl From<Schedule> for ScheduleSpec {
    fn from(schedule: Schedule) -> Self {
        let (interval, calendar) = match schedule.trigger {
            Trigger::Interval(secs) => (Some(secs.get()), None),
            Trigger::Calendar(cal) => (None, Some(cal)),
            Trigger::Unset => (None, None),
        };
        Self {
            interval,
            calendar,
            run_at_load: schedule.run_at_load,
        }
    }
}

/// launchd scheduling keys for one job definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeSchedule {
    pub start_interval: Option<u32>,
    pub start_calendar_interval: Option<Calendar>,
    pub run_at_load: bool,
}

impl Schedule {
    /// Parse a schedule object such as `{"interval": 300, "run_at_load": true}`.
    pub fn parse(json: &str) -> Result<Self, SchedulerError> {
        serde_json::from_str(json).map_err(|e| SchedulerError::MalformedSchedule(e.to_string()))
    }

    /// Map onto launchd's `StartInterval` / `StartCalendarInterval` / `RunAtLoad`.
    pub fn translate(&self) -> NativeSchedule {
        let mut native = NativeSchedule {
            run_at_load: self.run_at_load,
            ..Default::default()
        };
        match self.trigger {
            Trigger::Interval(secs) => native.start_interval = Some(secs.get()),
            Trigger::Calendar(cal) => native.start_calendar_interval = Some(cal),
            Trigger::Unset => {}
        }
        native
    }

    /// Short human-readable form used by `list`, e.g. "every 5 min" or "Mon 10:00".
    pub fn summary(&self) -> String {
        match self.trigger {
            Trigger::Interval(secs) => {
                let secs = secs.get();
                if secs % 60 == 0 {
                    format!("every {} min", secs / 60)
                } else {
                    format!("every {secs}s")
                }
            }
            Trigger::Calendar(cal) => {
                let mut parts = Vec::new();
                if let Some(day) = cal.weekday {
                    parts.push(weekday_name(day));
                }
                if let Some(hour) = cal.hour {
                    parts.push(format!("{hour:02}:{:02}", cal.minute.unwrap_or(0)));
                }
                if parts.is_empty() {
                    "calendar".to_string()
                } else {
                    parts.join(" ")
                }
            }
            Trigger::Unset if self.run_at_load => "at load".to_string(),
            Trigger::Unset => "unscheduled".to_string(),
        }
    }
}

// launchd treats both 0 and 7 as Sunday.
fn weekday_name(day: u8) -> String {
    match day {
        0..=7 => WEEKDAYS[usize::from(day % 7)].to_string(),
        other => format!("weekday {other}"),
    }
}
