use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const HOURS_PER_DAY: usize = 24;
pub const DAYS_PER_WEEK: usize = 7;
pub const WEEK_SLOTS: usize = HOURS_PER_DAY * DAYS_PER_WEEK;

// Setpoints outside this band are operator mistakes, not preferences.
const MIN_PLAUSIBLE_TEMP: i32 = 45;
const MAX_PLAUSIBLE_TEMP: i32 = 90;

#[derive(Debug, Error)]
pub enum MalformedSchedule {
    #[error("cannot read schedule: {0}")]
    Io(#[from] std::io::Error),
    #[error("schedule is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown timezone {0:?}")]
    Timezone(String),
    #[error("missing day {0:?}")]
    MissingDay(&'static str),
    #[error("bad time {time:?} on {day}")]
    BadTime { day: &'static str, time: String },
    #[error("duplicate hour {hour} on {day}")]
    DuplicateHour { day: &'static str, hour: u8 },
    #[error("implausible temperature {temperature} on {day} at hour {hour}")]
    ImplausibleTemperature {
        day: &'static str,
        hour: u8,
        temperature: i32,
    },
    #[error("implausible default temperature {0}")]
    ImplausibleDefault(i32),
}

// --- On-disk document shape ---

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Breakpoint {
    time: String,
    temperature: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DayTable {
    monday: Option<Vec<Breakpoint>>,
    tuesday: Option<Vec<Breakpoint>>,
    wednesday: Option<Vec<Breakpoint>>,
    thursday: Option<Vec<Breakpoint>>,
    friday: Option<Vec<Breakpoint>>,
    saturday: Option<Vec<Breakpoint>>,
    sunday: Option<Vec<Breakpoint>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScheduleDoc {
    timezone: String,
    default_temperature: i32,
    schedule: DayTable,
}

pub const DAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Validated weekly schedule: per-day breakpoint lists with unique,
/// ascending hours. Days are Monday-first throughout.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySchedule {
    pub timezone: Tz,
    pub default_temperature: i32,
    days: [Vec<(u8, i32)>; 7],
}

/// Fully resolved temperature for every hour of the week, as a flat
/// 168-slot arena indexed by `day * 24 + hour`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTable {
    slots: [i32; WEEK_SLOTS],
}

impl CompletedTable {
    pub fn get(&self, day: Weekday, hour: u32) -> i32 {
        self.slots[day.num_days_from_monday() as usize * HOURS_PER_DAY + hour as usize]
    }
}

impl WeeklySchedule {
    fn from_doc(doc: ScheduleDoc) -> Result<Self, MalformedSchedule> {
        let timezone = doc
            .timezone
            .parse::<Tz>()
            .map_err(|_| MalformedSchedule::Timezone(doc.timezone.clone()))?;

        if !(MIN_PLAUSIBLE_TEMP..=MAX_PLAUSIBLE_TEMP).contains(&doc.default_temperature) {
            return Err(MalformedSchedule::ImplausibleDefault(doc.default_temperature));
        }

        let source = [
            doc.schedule.monday,
            doc.schedule.tuesday,
            doc.schedule.wednesday,
            doc.schedule.thursday,
            doc.schedule.friday,
            doc.schedule.saturday,
            doc.schedule.sunday,
        ];

        let mut days: [Vec<(u8, i32)>; 7] = Default::default();
        for (slot, (name, entries)) in days.iter_mut().zip(DAY_NAMES.into_iter().zip(source)) {
            let entries = entries.ok_or(MalformedSchedule::MissingDay(name))?;
            let mut parsed = Vec::with_capacity(entries.len());
            for bp in &entries {
                let hour = parse_hour(&bp.time).ok_or_else(|| MalformedSchedule::BadTime {
                    day: name,
                    time: bp.time.clone(),
                })?;
                if !(MIN_PLAUSIBLE_TEMP..=MAX_PLAUSIBLE_TEMP).contains(&bp.temperature) {
                    return Err(MalformedSchedule::ImplausibleTemperature {
                        day: name,
                        hour,
                        temperature: bp.temperature,
                    });
                }
                parsed.push((hour, bp.temperature));
            }
            parsed.sort_by_key(|&(hour, _)| hour);
            if let Some(dup) = parsed.windows(2).find(|w| w[0].0 == w[1].0) {
                return Err(MalformedSchedule::DuplicateHour {
                    day: name,
                    hour: dup[0].0,
                });
            }
            *slot = parsed;
        }

        Ok(Self {
            timezone,
            default_temperature: doc.default_temperature,
            days,
        })
    }

    fn to_doc(&self) -> ScheduleDoc {
        let emit = |day: &Vec<(u8, i32)>| {
            Some(
                day.iter()
                    .map(|&(hour, temperature)| Breakpoint {
                        time: format!("{hour:02}:00"),
                        temperature,
                    })
                    .collect(),
            )
        };
        ScheduleDoc {
            timezone: self.timezone.name().to_string(),
            default_temperature: self.default_temperature,
            schedule: DayTable {
                monday: emit(&self.days[0]),
                tuesday: emit(&self.days[1]),
                wednesday: emit(&self.days[2]),
                thursday: emit(&self.days[3]),
                friday: emit(&self.days[4]),
                saturday: emit(&self.days[5]),
                sunday: emit(&self.days[6]),
            },
        }
    }

    /// Resolve every hour of the week by carrying the most recent earlier
    /// breakpoint forward, wrapping across the week boundary. A week with
    /// no breakpoints at all resolves entirely to the default temperature.
    pub fn complete(&self) -> CompletedTable {
        let mut carry = self
            .days
            .iter()
            .rev()
            .find_map(|day| day.last())
            .map(|&(_, temperature)| temperature)
            .unwrap_or(self.default_temperature);

        let mut slots = [0i32; WEEK_SLOTS];
        for (day, breakpoints) in self.days.iter().enumerate() {
            let mut pending = breakpoints.iter().peekable();
            for hour in 0..HOURS_PER_DAY {
                while let Some(&&(bp_hour, temperature)) = pending.peek() {
                    if bp_hour as usize <= hour {
                        carry = temperature;
                        pending.next();
                    } else {
                        break;
                    }
                }
                slots[day * HOURS_PER_DAY + hour] = carry;
            }
        }
        CompletedTable { slots }
    }

    /// The same schedule with every implicit hour materialized as an
    /// explicit breakpoint.
    pub fn materialized(&self) -> WeeklySchedule {
        let table = self.complete();
        let mut days: [Vec<(u8, i32)>; 7] = Default::default();
        for (day, breakpoints) in days.iter_mut().enumerate() {
            *breakpoints = (0..HOURS_PER_DAY)
                .map(|hour| (hour as u8, table.slots[day * HOURS_PER_DAY + hour]))
                .collect();
        }
        WeeklySchedule {
            timezone: self.timezone,
            default_temperature: self.default_temperature,
            days,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.days.iter().all(|day| day.len() == HOURS_PER_DAY)
    }

    /// Canonical serialized form: every hour explicit, days in week order.
    /// Input that resolves to the same table hashes identically.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.materialized().to_doc())
            .expect("schedule document serialization cannot fail")
    }
}

/// Breakpoint times are `HH:MM`; the schedule is an hourly step function,
/// so minutes are truncated to the hour.
fn parse_hour(time: &str) -> Option<u8> {
    let (hours, minutes) = time.split_once(':')?;
    let hour: u8 = hours.parse().ok()?;
    let minute: u8 = minutes.parse().ok()?;
    (hour <= 23 && minute <= 59 && minutes.len() == 2).then_some(hour)
}

/// Loads, validates, and persists the schedule document.
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read and validate the document as one snapshot. A racing external
    /// edit shows up as a validation failure; the caller retries next tick.
    pub fn load(&self) -> Result<WeeklySchedule, MalformedSchedule> {
        let raw = fs::read_to_string(&self.path)?;
        let doc: ScheduleDoc = serde_json::from_str(&raw)?;
        WeeklySchedule::from_doc(doc)
    }

    /// Write the schedule back atomically (temp file, then rename). A
    /// content-identical document is not rewritten.
    pub fn persist(&self, schedule: &WeeklySchedule) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(&schedule.to_doc())?;
        bytes.push(b'\n');

        if fs::read(&self.path).is_ok_and(|current| current == bytes) {
            debug!(path = %self.path.display(), "schedule already materialized, skipping write");
            return Ok(());
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming {} into place", tmp.display()))?;
        info!(path = %self.path.display(), "persisted gap-filled schedule");
        Ok(())
    }
}
