use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use crate::schedule::CompletedTable;

/// Temperature the schedule demands at `now_utc`, evaluated in `tz`.
///
/// The instant is converted to local time under the zone's rules (DST
/// included), truncated to `(weekday, hour)`, and looked up directly; the
/// schedule is a step function, so there is no interpolation. Pure for
/// identical inputs.
pub fn target_temperature(table: &CompletedTable, now_utc: DateTime<Utc>, tz: Tz) -> i32 {
    let local = now_utc.with_timezone(&tz);
    table.get(local.weekday(), local.hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ScheduleStore, WeeklySchedule};
    use chrono::TimeZone;
    use serde_json::json;

    fn load(doc: serde_json::Value) -> WeeklySchedule {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        ScheduleStore::new(&path).load().unwrap()
    }

    fn chicago_schedule() -> WeeklySchedule {
        load(json!({
            "timezone": "America/Chicago",
            "default_temperature": 68,
            "schedule": {
                "monday": [
                    {"time": "00:00", "temperature": 65},
                    {"time": "06:00", "temperature": 68},
                    {"time": "09:00", "temperature": 65},
                    {"time": "17:00", "temperature": 68},
                    {"time": "22:00", "temperature": 65}
                ],
                "tuesday": [], "wednesday": [], "thursday": [],
                "friday": [], "saturday": [], "sunday": []
            }
        }))
    }

    #[test]
    fn evening_breakpoint_applies_at_local_six_pm() {
        let schedule = chicago_schedule();
        let table = schedule.complete();

        // 2024-01-08 is a Monday; 18:00 in Chicago is 00:00 UTC next day.
        let local = schedule
            .timezone
            .with_ymd_and_hms(2024, 1, 8, 18, 0, 0)
            .unwrap();
        let target = target_temperature(&table, local.with_timezone(&Utc), schedule.timezone);
        assert_eq!(target, 68);
    }

    #[test]
    fn lookup_is_deterministic() {
        let schedule = chicago_schedule();
        let table = schedule.complete();
        let now = Utc.with_ymd_and_hms(2024, 1, 9, 3, 30, 0).unwrap();
        let first = target_temperature(&table, now, schedule.timezone);
        assert_eq!(first, target_temperature(&table, now, schedule.timezone));
    }

    #[test]
    fn dst_transition_uses_zone_rules() {
        let schedule = load(json!({
            "timezone": "America/Chicago",
            "default_temperature": 65,
            "schedule": {
                "monday": [], "tuesday": [], "wednesday": [], "thursday": [],
                "friday": [], "saturday": [],
                "sunday": [
                    {"time": "00:00", "temperature": 65},
                    {"time": "03:00", "temperature": 70}
                ]
            }
        }));
        let table = schedule.complete();

        // 2024-03-10: clocks jump from 02:00 CST to 03:00 CDT.
        let before = Utc.with_ymd_and_hms(2024, 3, 10, 7, 59, 0).unwrap(); // 01:59 CST
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 8, 30, 0).unwrap(); // 03:30 CDT
        assert_eq!(target_temperature(&table, before, schedule.timezone), 65);
        assert_eq!(target_temperature(&table, after, schedule.timezone), 70);
    }
}
