//! Decode Arr queue responses.

use serde_json::Value;

use super::QueueEntry;
use crate::retry::RequestError;

/// Decode a `/api/v3/queue` body. Accepts the paged form `{"records": [...]}`
/// and a bare array; any other JSON shape is an empty queue. Records with
/// missing or mistyped fields are kept with those fields unset.
pub fn parse_queue_body(body: &[u8]) -> Result<Vec<QueueEntry>, RequestError> {
    let value: Value = serde_json::from_slice(body)?;
    let records = match &value {
        Value::Object(map) => map.get("records").and_then(Value::as_array),
        Value::Array(items) => Some(items),
        _ => None,
    };
    let Some(records) = records else {
        return Ok(Vec::new());
    };
    Ok(records
        .iter()
        .map(|r| QueueEntry {
            id: r.get("id").and_then(Value::as_i64),
            download_id: r
                .get("downloadId")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect())
}
