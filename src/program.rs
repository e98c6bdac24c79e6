use sha2::{Digest, Sha256};

use thermostat_api::types::{ClimateProgram, ClimateSlot, DAYS_PER_WEEK, HOURS_PER_DAY};

use crate::schedule::{CompletedTable, WeeklySchedule};

/// Build the device program for a completed table: even hours map to the
/// night slot, odd hours to the day slot, identically every day.
///
/// The alternation is deliberately independent of the table's
/// temperatures. The program only has to give the device two named slots
/// covering all 24 hours; the hold mechanism carries the real setpoints.
pub fn synthesize(_table: &CompletedTable) -> ClimateProgram {
    let mut slots = [[ClimateSlot::Night; HOURS_PER_DAY]; DAYS_PER_WEEK];
    for day in slots.iter_mut() {
        for (hour, slot) in day.iter_mut().enumerate() {
            *slot = if hour % 2 == 0 {
                ClimateSlot::Night
            } else {
                ClimateSlot::Day
            };
        }
    }
    ClimateProgram { slots }
}

/// True when the two programs differ in any of their 168 slots.
pub fn diff(previous: &ClimateProgram, new: &ClimateProgram) -> bool {
    previous != new
}

/// Stable hash of the schedule's canonical form, used to notice edits
/// without deep-diffing the document every tick.
pub fn content_hash(schedule: &WeeklySchedule) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schedule.canonical_bytes());
    format!("{:x}", hasher.finalize())
}
