// Load history resolution and load-input validation
use crate::models::{LoadEntry, LoadInput};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Reduce a load history into the latest load per exercise name.
///
/// The entry with the most recent `recorded_on` wins. Entries sharing a date
/// resolve to the larger load, so the result never depends on input order.
/// Names without entries are simply absent.
pub fn resolve_latest_loads(entries: &[LoadEntry]) -> HashMap<String, f64> {
    let mut latest: HashMap<&str, (NaiveDate, f64)> = HashMap::new();
    for e in entries {
        let newer = latest.get(e.exercise_name.as_str()).map_or(true, |(date, load)| {
            e.recorded_on
                .cmp(date)
                .then_with(|| e.load.total_cmp(load))
                .is_gt()
        });
        if newer {
            latest.insert(e.exercise_name.as_str(), (e.recorded_on, e.load));
        }
    }
    latest
        .into_iter()
        .map(|(name, (_, load))| (name.to_string(), load))
        .collect()
}

/// Parse a typed load value.
///
/// Returns `None` for anything that is not a finite positive number; such
/// values count as "not filled in". A decimal comma is accepted.
pub fn parse_load_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: f64 = trimmed.replace(',', ".").parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// A validated load ready to be stored for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub student_id: String,
    pub exercise_name: String,
    pub load: f64,
    pub recorded_on: NaiveDate,
}

/// Build the records for a save on `day`.
///
/// Invalid values are skipped silently. Repeated exercise names collapse to
/// the last valid value, keeping the position of their first appearance, so
/// the batch never carries the same conflict key twice.
pub fn build_load_records(student_id: &str, inputs: &[LoadInput], day: NaiveDate) -> Vec<LoadRecord> {
    let mut records: Vec<LoadRecord> = Vec::new();
    let mut index_by_name: HashMap<&str, usize> = HashMap::new();
    for input in inputs {
        let Some(load) = parse_load_value(&input.value) else {
            continue;
        };
        let name = input.exercise_name.trim();
        if name.is_empty() {
            continue;
        }
        if let Some(&i) = index_by_name.get(name) {
            records[i].load = load;
            continue;
        }
        index_by_name.insert(name, records.len());
        records.push(LoadRecord {
            student_id: student_id.to_string(),
            exercise_name: name.to_string(),
            load,
            recorded_on: day,
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, load: f64, date: &str) -> LoadEntry {
        LoadEntry {
            student_id: "s1".into(),
            exercise_name: name.into(),
            load,
            recorded_on: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn newest_entry_wins_on_sorted_input() {
        let entries = vec![entry("Bench", 82.5, "2024-05-10"), entry("Bench", 80.0, "2024-05-01")];
        let map = resolve_latest_loads(&entries);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Bench"), Some(&82.5));
    }

    #[test]
    fn unsorted_input_resolves_the_same() {
        let sorted = vec![
            entry("Bench", 82.5, "2024-05-10"),
            entry("Row", 60.0, "2024-05-09"),
            entry("Bench", 80.0, "2024-05-01"),
            entry("Row", 55.0, "2024-04-20"),
            entry("Squat", 120.0, "2024-03-01"),
        ];
        let expected = resolve_latest_loads(&sorted);
        assert_eq!(expected.get("Row"), Some(&60.0));
        assert_eq!(expected.get("Squat"), Some(&120.0));

        // every rotation and the reverse must agree
        for shift in 0..sorted.len() {
            let mut rotated = sorted.clone();
            rotated.rotate_left(shift);
            assert_eq!(resolve_latest_loads(&rotated), expected);
        }
        let mut reversed = sorted.clone();
        reversed.reverse();
        assert_eq!(resolve_latest_loads(&reversed), expected);
        assert_eq!(resolve_latest_loads(&sorted), expected);
    }

    #[test]
    fn lower_value_on_newer_date_still_wins() {
        let entries = vec![entry("Curl", 20.0, "2024-01-01"), entry("Curl", 14.0, "2024-02-01")];
        assert_eq!(resolve_latest_loads(&entries).get("Curl"), Some(&14.0));
    }

    #[test]
    fn same_date_entries_resolve_regardless_of_order() {
        let entries = vec![
            entry("Bench", 80.0, "2024-05-10"),
            entry("Bench", 85.0, "2024-05-10"),
            entry("Bench", 90.0, "2024-05-01"),
            entry("Row", 50.0, "2024-05-10"),
        ];
        for shift in 0..entries.len() {
            let mut rotated = entries.clone();
            rotated.rotate_left(shift);
            let map = resolve_latest_loads(&rotated);
            assert_eq!(map.get("Bench"), Some(&85.0));
            assert_eq!(map.get("Row"), Some(&50.0));
            rotated.reverse();
            assert_eq!(resolve_latest_loads(&rotated), map);
        }
    }

    #[test]
    fn empty_history_gives_empty_map() {
        assert!(resolve_latest_loads(&[]).is_empty());
    }

    #[test]
    fn parse_load_value_filters_unfilled() {
        assert_eq!(parse_load_value("80"), Some(80.0));
        assert_eq!(parse_load_value(" 82,5 "), Some(82.5));
        assert_eq!(parse_load_value("0"), None);
        assert_eq!(parse_load_value("-5"), None);
        assert_eq!(parse_load_value("abc"), None);
        assert_eq!(parse_load_value(""), None);
        assert_eq!(parse_load_value("NaN"), None);
        assert_eq!(parse_load_value("inf"), None);
    }

    #[test]
    fn build_records_drops_invalid_values() {
        let inputs = vec![
            LoadInput::new("Bench", "0"),
            LoadInput::new("Row", "-5"),
            LoadInput::new("Fly", "abc"),
        ];
        assert!(build_load_records("s1", &inputs, day()).is_empty());
    }

    #[test]
    fn build_records_collapses_repeated_names() {
        let inputs = vec![
            LoadInput::new("Bench", "80"),
            LoadInput::new("Row", "50"),
            LoadInput::new("Bench", "85"),
            LoadInput::new("Row", ""),
        ];
        let records = build_load_records("s1", &inputs, day());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].exercise_name, "Bench");
        assert_eq!(records[0].load, 85.0);
        assert_eq!(records[1].exercise_name, "Row");
        assert_eq!(records[1].load, 50.0);
        assert!(records.iter().all(|r| r.recorded_on == day() && r.student_id == "s1"));
    }
}
