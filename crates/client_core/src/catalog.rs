use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use shared::{
    domain::{Meetup, MeetupId, UserId},
    protocol::RawMeetupRecord,
};

use crate::error::StoreError;

pub const FEATURED_LIMIT: usize = 5;

/// Projects the keyed mapping returned by a collection read into catalog order.
/// `None` and `null` both mean the collection is empty.
pub fn project_records(raw: Option<Value>) -> Result<Vec<Meetup>, StoreError> {
    let map = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(StoreError::MalformedCatalog(format!(
                "expected a keyed object, got {}",
                json_kind(&other)
            )))
        }
    };

    map.into_iter()
        .map(|(key, value)| {
            if !value.is_object() {
                return Err(StoreError::MalformedCatalog(format!(
                    "record {key} is {}, not an object",
                    json_kind(&value)
                )));
            }
            let record: RawMeetupRecord = serde_json::from_value(value)
                .map_err(|err| StoreError::MalformedCatalog(format!("record {key}: {err}")))?;
            Ok(Meetup {
                id: MeetupId(key),
                title: record.title,
                location: record.location,
                image_url: record.image_url,
                description: record.description,
                date: record.date,
                creator_id: UserId(record.creator_id),
            })
        })
        .collect()
}

/// Catalog copy ordered by ascending date; equal dates keep insertion order.
pub fn sorted_by_date(meetups: &[Meetup]) -> Vec<Meetup> {
    let mut sorted = meetups.to_vec();
    sorted.sort_by(|a, b| compare_dates(&a.date, &b.date));
    sorted
}

/// Three-way date comparison. Parseable timestamps (RFC 3339, naive
/// date-time, bare date or epoch milliseconds) order chronologically and
/// precede unparseable ones, which fall back to plain text order.
pub fn compare_dates(a: &str, b: &str) -> Ordering {
    match (parse_date(a), parse_date(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    // Epoch milliseconds, as written by clients that store `Date.now()`.
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|parsed| parsed.naive_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
