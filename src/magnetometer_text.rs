use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::warn;

use crate::constants::MAGNETOMETER_MISSING_SENTINEL;
use crate::normalize::NormalizedRecord;
use crate::utils::iso_utc;

static SAMPLE_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\d{4})\s+(\d{1,2})\s+(\d{1,2})\s+(\d{1,2})\s+(\d{1,2})\s+(\d{1,2})\s+([-+]?\d+(?:\.\d+)?)\s+([-+]?\d+(?:\.\d+)?)\s+([-+]?\d+(?:\.\d+)?)\s*$",
    )
    .inspect_err(|error| warn!("Magnetometer sample pattern failed to compile: {error}"))
    .ok()
});

// `YYYY MM DD hh mm ss X Y Z` lines; anything else is skipped.
pub fn parse_day_dump(text: &str) -> Vec<NormalizedRecord> {
    let Some(pattern) = SAMPLE_LINE.as_ref() else {
        return Vec::new();
    };

    text.lines()
        .filter_map(|line| {
            let captures = pattern.captures(line)?;
            let int = |index: usize| captures.get(index)?.as_str().parse::<u32>().ok();
            let float = |index: usize| {
                captures
                    .get(index)?
                    .as_str()
                    .parse::<f64>()
                    .ok()
                    .filter(|value| {
                        value.is_finite() && value.abs() < MAGNETOMETER_MISSING_SENTINEL
                    })
            };

            let date = NaiveDate::from_ymd_opt(int(1)? as i32, int(2)?, int(3)?)?;
            let time: NaiveDateTime = date.and_hms_opt(int(4)?, int(5)?, int(6)?)?;

            let mut record = NormalizedRecord::new(iso_utc(time.and_utc()));
            for (field, index) in [("x", 7), ("y", 8), ("z", 9)] {
                if let Some(value) = float(index) {
                    record.insert_number(field, value);
                }
            }
            Some(record)
        })
        .collect()
}
