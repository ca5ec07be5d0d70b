use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::UpstreamError;
use crate::normalize::{pick, pick_text, NormalizedRecord};
use crate::utils::{iso_utc, parse_time_utc, round_to};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feed {
    Primary,
    Secondary,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub feed: Feed,
    pub candidates: &'static [&'static str],
    pub decimals: i32,
}

#[derive(Clone, Debug)]
pub struct AlignmentOptions {
    pub window: usize,
    pub offset_minutes: i64,
    pub source_keys: &'static [&'static str],
    pub default_source: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlignedPoint {
    pub time: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CurrentBasis {
    Joined,
    PerField,
}

#[derive(Clone, Debug)]
pub struct AlignedSeries {
    pub series: Vec<AlignedPoint>,
    pub current: AlignedPoint,
    pub basis: CurrentBasis,
    pub source: String,
}

#[derive(Default)]
struct Slot<'a> {
    primary: Option<&'a NormalizedRecord>,
    secondary: Option<&'a NormalizedRecord>,
}

impl<'a> Slot<'a> {
    fn record(&self, feed: Feed) -> Option<&'a NormalizedRecord> {
        match feed {
            Feed::Primary => self.primary,
            Feed::Secondary => self.secondary,
        }
    }
}

pub fn align(
    primary: &[NormalizedRecord],
    secondary: &[NormalizedRecord],
    fields: &[FieldSpec],
    options: &AlignmentOptions,
) -> Result<AlignedSeries, UpstreamError> {
    let mut slots: BTreeMap<DateTime<Utc>, Slot> = BTreeMap::new();
    for record in primary {
        if let Some(time) = parse_time_utc(&record.time_tag) {
            slots.entry(time).or_default().primary = Some(record);
        }
    }
    for record in secondary {
        if let Some(time) = parse_time_utc(&record.time_tag) {
            slots.entry(time).or_default().secondary = Some(record);
        }
    }

    if slots.is_empty() {
        return Err(UpstreamError::Malformed(
            "neither feed contained a parseable timestamp".to_string(),
        ));
    }

    let out_of_range = || {
        UpstreamError::Malformed(format!(
            "time offset of {} minutes is out of range",
            options.offset_minutes
        ))
    };
    let offset = Duration::try_minutes(options.offset_minutes).ok_or_else(out_of_range)?;
    // the extremes bound every shifted instant
    for time in [slots.keys().next(), slots.keys().next_back()].into_iter().flatten() {
        time.checked_add_signed(offset).ok_or_else(out_of_range)?;
    }
    let extract = |time: &DateTime<Utc>, slot: &Slot| AlignedPoint {
        time: iso_utc(*time + offset),
        values: fields
            .iter()
            .map(|field| {
                slot.record(field.feed)
                    .and_then(|record| pick(record, field.candidates))
                    .map(|value| round_to(value, field.decimals))
            })
            .collect(),
    };

    let skip = slots.len().saturating_sub(options.window);
    let series = slots
        .iter()
        .skip(skip)
        .map(|(time, slot)| extract(time, slot))
        .collect::<Vec<_>>();

    let joined = slots.iter().rev().find_map(|(time, slot)| {
        if slot.primary.is_none() || slot.secondary.is_none() {
            return None;
        }
        let point = extract(time, slot);
        point.values.iter().all(Option::is_some).then_some(point)
    });

    let (current, basis) = match joined {
        Some(point) => (point, CurrentBasis::Joined),
        None => (latest_per_field(&series, fields.len()), CurrentBasis::PerField),
    };

    let source = slots
        .values()
        .rev()
        .flat_map(|slot| [slot.secondary, slot.primary])
        .flatten()
        .find_map(|record| pick_text(record, options.source_keys))
        .unwrap_or(options.default_source)
        .to_string();

    Ok(AlignedSeries {
        series,
        current,
        basis,
        source,
    })
}

fn latest_per_field(series: &[AlignedPoint], field_count: usize) -> AlignedPoint {
    let values = (0..field_count)
        .map(|index| {
            series
                .iter()
                .rev()
                .find_map(|point| point.values.get(index).copied().flatten())
        })
        .collect();
    AlignedPoint {
        time: series
            .last()
            .map(|point| point.time.clone())
            .unwrap_or_default(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: [FieldSpec; 4] = [
        FieldSpec {
            feed: Feed::Primary,
            candidates: &["speed"],
            decimals: 1,
        },
        FieldSpec {
            feed: Feed::Primary,
            candidates: &["density"],
            decimals: 2,
        },
        FieldSpec {
            feed: Feed::Secondary,
            candidates: &["bz_gsm"],
            decimals: 1,
        },
        FieldSpec {
            feed: Feed::Secondary,
            candidates: &["bt"],
            decimals: 1,
        },
    ];

    fn options(window: usize) -> AlignmentOptions {
        AlignmentOptions {
            window,
            offset_minutes: 0,
            source_keys: &["source"],
            default_source: "DSCOVR",
        }
    }

    fn rec(time: &str, fields: &[(&str, f64)]) -> NormalizedRecord {
        let mut record = NormalizedRecord::new(time);
        for (key, value) in fields {
            record.insert_number(key, *value);
        }
        record
    }

    const T1: &str = "2024-01-01 12:00:00.000";
    const T2: &str = "2024-01-01 12:01:00.000";
    const T3: &str = "2024-01-01 12:02:00.000";
    const T4: &str = "2024-01-01 12:03:00.000";

    #[test]
    fn current_uses_latest_instant_complete_in_both_feeds() {
        let plasma = vec![
            rec(T1, &[("speed", 400.0), ("density", 5.0)]),
            rec(T2, &[("speed", 401.0)]),
            rec(T3, &[("speed", 402.0), ("density", 5.5)]),
        ];
        let mag = vec![
            rec(T2, &[("bz_gsm", -1.0), ("bt", 4.0)]),
            rec(T3, &[("bz_gsm", -2.0), ("bt", 5.0)]),
            rec(T4, &[("bz_gsm", -3.0), ("bt", 6.0)]),
        ];

        let aligned = align(&plasma, &mag, &FIELDS, &options(60)).unwrap();
        assert_eq!(aligned.basis, CurrentBasis::Joined);
        assert_eq!(aligned.current.time, "2024-01-01T12:02:00.000Z");
        assert_eq!(
            aligned.current.values,
            vec![Some(402.0), Some(5.5), Some(-2.0), Some(5.0)]
        );
    }

    #[test]
    fn series_is_the_sorted_union_of_both_feeds() {
        let plasma = vec![rec(T3, &[("speed", 402.0)]), rec(T1, &[("speed", 400.0)])];
        let mag = vec![rec(T4, &[("bt", 6.0)]), rec(T2, &[("bt", 4.0)])];

        let aligned = align(&plasma, &mag, &FIELDS, &options(60)).unwrap();
        let times = aligned
            .series
            .iter()
            .map(|point| point.time.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            times,
            vec![
                "2024-01-01T12:00:00.000Z",
                "2024-01-01T12:01:00.000Z",
                "2024-01-01T12:02:00.000Z",
                "2024-01-01T12:03:00.000Z",
            ]
        );
        assert_eq!(aligned.series[1].values, vec![None, None, None, Some(4.0)]);
    }

    #[test]
    fn differently_formatted_timestamps_for_one_instant_share_a_slot() {
        let plasma = vec![rec("2024-01-01 12:00:00.000", &[("speed", 400.0), ("density", 5.0)])];
        let mag = vec![rec("2024-01-01T12:00:00Z", &[("bz_gsm", -1.0), ("bt", 4.0)])];

        let aligned = align(&plasma, &mag, &FIELDS, &options(60)).unwrap();
        assert_eq!(aligned.series.len(), 1);
        assert_eq!(aligned.basis, CurrentBasis::Joined);
    }

    #[test]
    fn falls_back_to_latest_value_per_field_without_a_complete_instant() {
        let plasma = vec![
            rec(T1, &[("speed", 400.0), ("density", 5.0)]),
            rec(T2, &[("speed", 410.0)]),
        ];
        let mag = vec![rec(T1, &[("bz_gsm", -1.0)]), rec(T3, &[("bt", 7.0)])];

        let aligned = align(&plasma, &mag, &FIELDS, &options(60)).unwrap();
        assert_eq!(aligned.basis, CurrentBasis::PerField);
        assert_eq!(
            aligned.current.values,
            vec![Some(410.0), Some(5.0), Some(-1.0), Some(7.0)]
        );
        assert_eq!(aligned.current.time, "2024-01-01T12:02:00.000Z");
    }

    #[test]
    fn window_keeps_only_the_most_recent_instants() {
        let start = parse_time_utc(T1).unwrap() - Duration::minutes(120);
        let plasma = (0..100)
            .map(|minute| {
                rec(
                    &iso_utc(start + Duration::minutes(minute)),
                    &[("speed", minute as f64), ("density", 1.0)],
                )
            })
            .collect::<Vec<_>>();
        let mag = vec![rec("2024-01-01 10:05:00", &[("bz_gsm", 1.0), ("bt", 2.0)])];

        let aligned = align(&plasma, &mag, &FIELDS, &options(60)).unwrap();
        assert_eq!(aligned.series.len(), 60);
        assert_eq!(aligned.series[0].time, "2024-01-01T10:40:00.000Z");
        assert_eq!(aligned.series[59].time, "2024-01-01T11:39:00.000Z");
        // the strict join searches the full union, not just the window
        assert_eq!(aligned.basis, CurrentBasis::Joined);
        assert_eq!(aligned.current.time, "2024-01-01T10:05:00.000Z");
    }

    #[test]
    fn offset_shifts_reported_times() {
        let plasma = vec![rec(T1, &[("speed", 400.0), ("density", 5.0)])];
        let mag = vec![rec(T1, &[("bz_gsm", -1.0), ("bt", 4.0)])];
        let mut opts = options(60);
        opts.offset_minutes = 30;

        let aligned = align(&plasma, &mag, &FIELDS, &opts).unwrap();
        assert_eq!(aligned.current.time, "2024-01-01T12:30:00.000Z");
        assert_eq!(aligned.series[0].time, "2024-01-01T12:30:00.000Z");
    }

    #[test]
    fn unrepresentable_offset_is_an_error() {
        let plasma = vec![rec(T1, &[("speed", 400.0), ("density", 5.0)])];
        let mag = vec![rec(T1, &[("bz_gsm", -1.0), ("bt", 4.0)])];
        let mut opts = options(60);
        opts.offset_minutes = i64::MAX;
        assert!(align(&plasma, &mag, &FIELDS, &opts).is_err());

        opts.offset_minutes = 5_000_000_000_000;
        assert!(align(&plasma, &mag, &FIELDS, &opts).is_err());
    }

    #[test]
    fn values_are_rounded_per_field() {
        let plasma = vec![rec(T1, &[("speed", 412.36), ("density", 5.678)])];
        let mag = vec![rec(T1, &[("bz_gsm", -3.14), ("bt", 6.06)])];

        let aligned = align(&plasma, &mag, &FIELDS, &options(60)).unwrap();
        assert_eq!(
            aligned.current.values,
            vec![Some(412.4), Some(5.68), Some(-3.1), Some(6.1)]
        );
    }

    #[test]
    fn source_comes_from_newest_record_that_names_one() {
        let time = serde_json::json!(T2);
        let bt = serde_json::json!(4.0);
        let source = serde_json::json!("ACE");
        let tagged = NormalizedRecord::from_pairs([
            ("time_tag", &time),
            ("bt", &bt),
            ("source", &source),
        ])
        .unwrap();
        let plasma = vec![rec(T1, &[("speed", 400.0)])];

        let aligned = align(&plasma, &[tagged], &FIELDS, &options(60)).unwrap();
        assert_eq!(aligned.source, "ACE");

        let aligned = align(&plasma, &[], &FIELDS, &options(60)).unwrap();
        assert_eq!(aligned.source, "DSCOVR");
    }

    #[test]
    fn unparseable_timestamps_only_is_an_error() {
        let plasma = vec![rec("not a time", &[("speed", 400.0)])];
        assert!(align(&plasma, &[], &FIELDS, &options(60)).is_err());
    }
}
