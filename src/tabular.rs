use serde_json::Value;

use crate::error::UpstreamError;
use crate::normalize::NormalizedRecord;

pub fn parse_feed(value: &Value) -> Result<Vec<NormalizedRecord>, UpstreamError> {
    let rows = value
        .as_array()
        .ok_or_else(|| UpstreamError::Malformed("feed is not a JSON array".to_string()))?;

    match rows.first() {
        None => Ok(Vec::new()),
        Some(Value::Array(header)) => parse_header_rows(header, &rows[1..]),
        Some(Value::Object(_)) => Ok(parse_object_rows(rows)),
        Some(other) => Err(UpstreamError::Malformed(format!(
            "unexpected feed row shape: {other}"
        ))),
    }
}

pub fn parse_feed_text(text: &str) -> Result<Vec<NormalizedRecord>, UpstreamError> {
    let value = serde_json::from_str::<Value>(text)
        .map_err(|error| UpstreamError::Malformed(error.to_string()))?;
    parse_feed(&value)
}

fn parse_header_rows(
    header: &[Value],
    rows: &[Value],
) -> Result<Vec<NormalizedRecord>, UpstreamError> {
    let columns = header
        .iter()
        .map(|column| {
            column.as_str().ok_or_else(|| {
                UpstreamError::Malformed(format!("non-string header column: {column}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .iter()
        .filter_map(Value::as_array)
        .filter_map(|cells| {
            NormalizedRecord::from_pairs(columns.iter().copied().zip(cells.iter()))
        })
        .collect())
}

fn parse_object_rows(rows: &[Value]) -> Vec<NormalizedRecord> {
    rows.iter()
        .filter_map(Value::as_object)
        .filter_map(|object| {
            NormalizedRecord::from_pairs(object.iter().map(|(key, value)| (key.as_str(), value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn header_rows_are_zipped_with_their_columns() {
        let feed = json!([
            ["time_tag", "density", "speed", "temperature"],
            ["2024-01-01 00:00:00.000", "5.12", "412.3", "98000"],
            ["2024-01-01 00:01:00.000", "5.20", null, "97000"]
        ]);
        let records = parse_feed(&feed).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].number("density"), Some(5.12));
        assert_eq!(records[0].number("speed"), Some(412.3));
        assert_eq!(records[1].number("speed"), None);
    }

    #[test]
    fn object_rows_normalize_to_the_same_shape() {
        let feed = json!([
            {"time_tag": "2024-01-01T00:00:00", "proton_speed": 412.3, "source": "ACE"},
            {"Time_Tag": "2024-01-01T00:01:00", "proton_speed": "410"}
        ]);
        let records = parse_feed(&feed).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("source"), Some("ACE"));
        assert_eq!(records[1].number("proton_speed"), Some(410.0));
    }

    #[test]
    fn rows_without_time_tags_are_dropped() {
        let feed = json!([
            ["time_tag", "kp"],
            [null, "3"],
            ["", "4"],
            ["2024-01-01 03:00:00", "2.67"],
            "garbage"
        ]);
        let records = parse_feed(&feed).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number("kp"), Some(2.67));
    }

    #[test]
    fn short_rows_only_fill_the_columns_they_have() {
        let feed = json!([["time_tag", "bz_gsm", "bt"], ["2024-01-01 00:00:00", "-3.1"]]);
        let records = parse_feed(&feed).unwrap();
        assert_eq!(records[0].number("bz_gsm"), Some(-3.1));
        assert_eq!(records[0].number("bt"), None);
    }

    #[test]
    fn non_array_payloads_are_malformed() {
        assert!(matches!(
            parse_feed(&json!({"error": "maintenance"})),
            Err(UpstreamError::Malformed(_))
        ));
        assert!(matches!(
            parse_feed_text("<html>"),
            Err(UpstreamError::Malformed(_))
        ));
    }

    #[test]
    fn empty_feed_is_empty() {
        assert!(parse_feed(&json!([])).unwrap().is_empty());
    }
}
