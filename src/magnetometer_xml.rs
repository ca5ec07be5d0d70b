use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::UpstreamError;
use crate::normalize::NormalizedRecord;
use crate::utils::{iso_utc, parse_time_utc};

#[derive(Clone, Copy, PartialEq)]
enum Capture {
    Time,
    ParameterName,
    ParameterValue,
}

#[derive(Default)]
struct Element {
    timed: bool,
    name: Option<String>,
    value: Option<String>,
}

// elements sharing a timestamp fold into one record
pub fn parse_wfs_observations(
    xml: &str,
    parameters: &[(&str, &str)],
) -> Result<Vec<NormalizedRecord>, UpstreamError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<NormalizedRecord> = None;
    let mut element = Element::default();
    let mut capture: Option<Capture> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                capture = match e.local_name().as_ref() {
                    b"Time" => Some(Capture::Time),
                    b"ParameterName" => Some(Capture::ParameterName),
                    b"ParameterValue" => Some(Capture::ParameterValue),
                    b"BsWfsElement" => {
                        element = Element::default();
                        None
                    }
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                let Some(target) = capture else {
                    continue;
                };
                let text = t
                    .unescape()
                    .map_err(|error| UpstreamError::Malformed(error.to_string()))?
                    .trim()
                    .to_string();
                match target {
                    Capture::Time => {
                        let Some(time) = parse_time_utc(&text) else {
                            element.timed = false;
                            continue;
                        };
                        element.timed = true;
                        let time_tag = iso_utc(time);
                        let starts_new_row = current
                            .as_ref()
                            .map(|row| row.time_tag != time_tag)
                            .unwrap_or(true);
                        if starts_new_row {
                            flush(&mut records, current.take());
                            current = Some(NormalizedRecord::new(time_tag));
                        }
                    }
                    Capture::ParameterName => element.name = Some(text),
                    Capture::ParameterValue => element.value = Some(text),
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"BsWfsElement" && element.timed {
                    if let (Some(row), Some(name), Some(value)) =
                        (current.as_mut(), element.name.take(), element.value.take())
                    {
                        let field = parameters
                            .iter()
                            .find(|(parameter, _)| parameter.eq_ignore_ascii_case(&name))
                            .map(|(_, field)| *field);
                        if let (Some(field), Ok(number)) = (field, value.parse::<f64>()) {
                            row.insert_number(field, number);
                        }
                    }
                }
                capture = None;
            }
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(UpstreamError::Malformed(format!(
                    "XML parsing error at position {}: {error}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    flush(&mut records, current);
    Ok(records)
}

fn flush(records: &mut Vec<NormalizedRecord>, row: Option<NormalizedRecord>) {
    if let Some(row) = row.filter(|row| !row.is_empty()) {
        records.push(row);
    }
}
