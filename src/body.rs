use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::NormalizeError;
use crate::view::{BodyStream, rewind_and_read};

/// Bodies longer than this many bytes are never read.
pub const MAX_BODY_SIZE: u64 = 1_048_576;

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Bounded rendering of a message body.
///
/// Either `notice` is set, or any of `parsed` and `raw`, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBody {
    pub content_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl NormalizedBody {
    /// Record form of the body, with the same keys as its `Serialize` output.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("contentLength".into(), Value::from(self.content_length));
        if let Some(content_type) = &self.content_type {
            map.insert("contentType".into(), Value::from(content_type.clone()));
        }
        if let Some(notice) = &self.notice {
            map.insert("notice".into(), Value::from(notice.clone()));
        }
        if let Some(parsed) = &self.parsed {
            map.insert("parsed".into(), parsed.clone());
        }
        if let Some(raw) = &self.raw {
            map.insert("raw".into(), Value::from(raw.clone()));
        }
        Value::Object(map)
    }

    fn new(content_length: u64, content_type: Option<&str>) -> Self {
        NormalizedBody {
            content_length,
            content_type: content_type.map(str::to_string),
            notice: None,
            parsed: None,
            raw: None,
        }
    }
}

fn oversize_notice() -> String {
    format!("Body omitted: content length exceeds the {MAX_BODY_SIZE} byte limit")
}

/// Decide whether, and how much, of a body ends up in a record.
///
/// An empty body yields `None`. A body over [`MAX_BODY_SIZE`] gets a notice
/// without the stream being touched. Multipart bodies the framework did not
/// parse are reported without content. Otherwise the stream is rewound and
/// read in full.
pub fn normalize_body(
    body: &mut dyn BodyStream,
    content_type: Option<&str>,
    content_length: u64,
    parsed_body: Option<&Value>,
) -> Result<Option<NormalizedBody>, NormalizeError> {
    if content_length == 0 {
        return Ok(None);
    }

    let mut normalized = NormalizedBody::new(content_length, content_type);

    if content_length > MAX_BODY_SIZE {
        normalized.notice = Some(oversize_notice());
        return Ok(Some(normalized));
    }

    match parsed_body {
        Some(parsed) => normalized.parsed = Some(parsed.clone()),
        None if content_type == Some(MULTIPART_FORM_DATA) => return Ok(Some(normalized)),
        None => {}
    }

    let raw = rewind_and_read(body)?;
    if !raw.is_empty() {
        normalized.raw = Some(String::from_utf8_lossy(&raw).into_owned());
    }

    Ok(Some(normalized))
}
