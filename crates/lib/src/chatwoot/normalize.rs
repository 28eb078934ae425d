//! Envelope normalization for proxy responses.
//!
//! The proxy is not schema-stable across endpoints: the same list may arrive as
//! `{data:{payload:[..]}}`, `{data:[..]}`, `{payload:[..]}`, `{agents:[..]}`, a bare array,
//! or `{data:{agents:[..]}}`. Callers always get a vector back.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Top-level keys some endpoints use for their list.
pub const COLLECTION_KEYS: [&str; 6] = [
    "agents",
    "contacts",
    "teams",
    "inboxes",
    "conversations",
    "messages",
];

/// Where the list was found in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `{data:{payload:[..]}}`
    DataPayload,
    /// `{data:[..]}`
    Data,
    /// `{payload:[..]}`
    Payload,
    /// `{<key>:[..]}` for one of [`COLLECTION_KEYS`]
    Keyed(&'static str),
    /// `[..]`
    Bare,
    /// `{data:{<key>:[..]}}`
    DataKeyed(&'static str),
}

fn is_array_at(value: Option<&Value>) -> bool {
    value.map_or(false, Value::is_array)
}

/// Detect the envelope shape, trying known shapes in a fixed order. None when nothing matches.
pub fn detect_envelope(payload: &Value) -> Option<Envelope> {
    let data = payload.get("data");
    if is_array_at(data.and_then(|d| d.get("payload"))) {
        return Some(Envelope::DataPayload);
    }
    if is_array_at(data) {
        return Some(Envelope::Data);
    }
    if is_array_at(payload.get("payload")) {
        return Some(Envelope::Payload);
    }
    if let Some(key) = COLLECTION_KEYS
        .iter()
        .find(|k| is_array_at(payload.get(**k)))
    {
        return Some(Envelope::Keyed(*key));
    }
    if payload.is_array() {
        return Some(Envelope::Bare);
    }
    COLLECTION_KEYS
        .iter()
        .find(|k| is_array_at(data.and_then(|d| d.get(**k))))
        .map(|k| Envelope::DataKeyed(*k))
}

/// Short description of a payload's shape for diagnostics.
fn describe_shape(payload: &Value) -> String {
    match payload {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(_) => "array".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Null => "null".to_string(),
    }
}

/// Extract the list of records from a proxy payload. Order is preserved; unknown shapes yield an empty vector.
pub fn extract_records(mut payload: Value, label: &str) -> Vec<Value> {
    let Some(envelope) = detect_envelope(&payload) else {
        log::warn!(
            "normalize {}: unrecognized response shape ({}), treating as empty",
            label,
            describe_shape(&payload)
        );
        return Vec::new();
    };
    log::debug!("normalize {}: matched {:?}", label, envelope);
    let slot = match envelope {
        Envelope::DataPayload => payload.get_mut("data").and_then(|d| d.get_mut("payload")),
        Envelope::Data => payload.get_mut("data"),
        Envelope::Payload => payload.get_mut("payload"),
        Envelope::Keyed(key) => payload.get_mut(key),
        Envelope::Bare => Some(&mut payload),
        Envelope::DataKeyed(key) => payload.get_mut("data").and_then(|d| d.get_mut(key)),
    };
    match slot.map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Deserialize records into `T`, dropping (and logging) any record that does not fit.
pub fn parse_records<T: DeserializeOwned>(records: Vec<Value>, label: &str) -> Vec<T> {
    let total = records.len();
    let parsed: Vec<T> = records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match serde_json::from_value(record) {
            Ok(r) => Some(r),
            Err(e) => {
                log::warn!("normalize {}: dropping record {}: {}", label, i, e);
                None
            }
        })
        .collect();
    if parsed.len() < total {
        log::debug!("normalize {}: kept {} of {} records", label, parsed.len(), total);
    }
    parsed
}
