//! Row value codec
//!
//! Import rows hold heterogeneous field values captured from a source
//! system. This module is the single place that knows the persisted
//! tagging scheme: each value is stored as a `{"t": tag, "v": payload}`
//! object so the original type (null, bool, integer, float, text,
//! date-time, nested list) survives the round trip through the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One heterogeneous field value within an import row.
///
/// Integer and float are kept as distinct kinds so that e.g. a source
/// system's `42` does not come back as `42.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// True when the value is the null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// Encode an ordered value sequence into the persisted blob form.
pub fn encode_row(values: &[FieldValue]) -> Result<String> {
    serde_json::to_string(values).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a persisted blob back into the ordered value sequence.
///
/// A blob that does not match the expected shape yields
/// [`Error::Serialization`]; decoding never panics.
pub fn decode_row(blob: &str) -> Result<Vec<FieldValue>> {
    serde_json::from_str(blob).map_err(|e| Error::Serialization(e.to_string()))
}
