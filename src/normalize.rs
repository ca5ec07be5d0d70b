use std::collections::BTreeMap;

use serde_json::Value;

pub const TIME_TAG: &str = "time_tag";

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Number(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedRecord {
    pub time_tag: String,
    fields: BTreeMap<String, FieldValue>,
}

impl NormalizedRecord {
    pub fn new(time_tag: impl Into<String>) -> Self {
        Self {
            time_tag: time_tag.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut time_tag = None;
        let mut fields = BTreeMap::new();

        for (key, value) in pairs {
            let key = canonical_field_name(key);
            if key == TIME_TAG {
                if let Some(tag) = value.as_str().map(str::trim).filter(|tag| !tag.is_empty()) {
                    time_tag = Some(tag.to_string());
                }
                continue;
            }
            if let Some(normalized) = normalize_value(value) {
                fields.insert(key, normalized);
            }
        }

        Some(Self {
            time_tag: time_tag?,
            fields,
        })
    }

    pub fn insert_number(&mut self, key: &str, value: f64) {
        if value.is_finite() {
            self.fields
                .insert(canonical_field_name(key), FieldValue::Number(value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(&canonical_field_name(key)).or_else(|| {
            let folded = fold_key(key);
            self.fields
                .iter()
                .find(|(candidate, _)| fold_key(candidate) == folded)
                .map(|(_, value)| value)
        })
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_number)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub fn canonical_field_name(key: &str) -> String {
    let lowered = key.trim().to_lowercase();
    if matches!(lowered.as_str(), "time" | "timestamp" | "time_tag" | "timetag") {
        TIME_TAG.to_string()
    } else {
        lowered
    }
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|ch| *ch != '_' && *ch != '-' && !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn normalize_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .filter(|parsed| parsed.is_finite())
            .map(FieldValue::Number),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => Some(FieldValue::Number(parsed)),
                Ok(_) => None,
                Err(_) => Some(FieldValue::Text(trimmed.to_string())),
            }
        }
        _ => None,
    }
}

pub fn pick(record: &NormalizedRecord, candidates: &[&str]) -> Option<f64> {
    candidates
        .iter()
        .find_map(|candidate| record.number(candidate))
}

pub fn pick_text<'a>(record: &'a NormalizedRecord, candidates: &[&str]) -> Option<&'a str> {
    candidates
        .iter()
        .find_map(|candidate| record.text(candidate))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::constants::{BZ_KEYS, SPEED_KEYS};

    fn record(value: Value) -> NormalizedRecord {
        let object = value.as_object().unwrap().clone();
        NormalizedRecord::from_pairs(object.iter().map(|(key, value)| (key.as_str(), value)))
            .unwrap()
    }

    #[test]
    fn numeric_strings_become_numbers() {
        let rec = record(json!({"time_tag": "2024-01-01 00:00:00", "Speed": "412.5"}));
        assert_eq!(rec.get("speed"), Some(&FieldValue::Number(412.5)));
    }

    #[test]
    fn non_numeric_values_are_kept_as_text_and_nulls_dropped() {
        let rec = record(json!({
            "time_tag": "2024-01-01 00:00:00",
            "source": "ACE",
            "bz_gsm": null,
            "bt": "NaN"
        }));
        assert_eq!(rec.text("source"), Some("ACE"));
        assert!(rec.get("bz_gsm").is_none());
        assert!(rec.get("bt").is_none());
    }

    #[test]
    fn rows_without_time_tag_are_rejected() {
        let object = json!({"speed": 400}).as_object().unwrap().clone();
        let rec =
            NormalizedRecord::from_pairs(object.iter().map(|(key, value)| (key.as_str(), value)));
        assert!(rec.is_none());
    }

    #[test]
    fn pick_resolves_the_same_value_across_naming_variants() {
        let variants = ["speed", "Speed", "flow_speed", "FLOW_SPEED", "proton_speed", "V"];
        for name in variants {
            let rec = record(json!({"time_tag": "t", name: 421.0}));
            assert_eq!(pick(&rec, &SPEED_KEYS), Some(421.0), "variant {name}");
        }
    }

    #[test]
    fn pick_matches_underscore_free_spellings() {
        let rec = record(json!({"time_tag": "t", "BzGsm": -4.2}));
        assert_eq!(pick(&rec, &BZ_KEYS), Some(-4.2));
    }

    #[test]
    fn pick_respects_candidate_priority() {
        let rec = record(json!({"time_tag": "t", "speed": 400.0, "v": 999.0}));
        assert_eq!(pick(&rec, &SPEED_KEYS), Some(400.0));
    }

    #[test]
    fn pick_skips_candidates_that_are_not_numeric() {
        let rec = record(json!({"time_tag": "t", "speed": "n/a", "flow_speed": "380"}));
        assert_eq!(pick(&rec, &SPEED_KEYS), Some(380.0));
    }

    #[test]
    fn alternate_time_column_names_are_recognised() {
        let rec = record(json!({"Time": "2024-01-01T00:00:00Z", "kp": 3}));
        assert_eq!(rec.time_tag, "2024-01-01T00:00:00Z");
    }
}
