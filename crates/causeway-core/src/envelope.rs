//! Success/failure wire envelope.

use crate::error::ErrorCode;
use crate::issue::Issue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a failed response, nested under `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub message: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub issues: Option<Vec<Issue>>,
}

/// Envelope wrapping every gateway response.
///
/// Serializes as `{"ok":true,"data":..}` or `{"ok":false,"error":{..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawEnvelope", try_from = "RawEnvelope")]
pub enum WireEnvelope {
    Success { data: Value },
    Failure(ErrorShape),
}

impl WireEnvelope {
    pub fn success(data: Value) -> Self {
        WireEnvelope::Success { data }
    }

    pub fn failure(error: ErrorShape) -> Self {
        WireEnvelope::Failure(error)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, WireEnvelope::Success { .. })
    }

    /// Serialize to JSON bytes
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    error: Option<ErrorShape>,
}

impl From<WireEnvelope> for RawEnvelope {
    fn from(envelope: WireEnvelope) -> Self {
        match envelope {
            WireEnvelope::Success { data } => RawEnvelope {
                ok: true,
                data: Some(data),
                error: None,
            },
            WireEnvelope::Failure(error) => RawEnvelope {
                ok: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<RawEnvelope> for WireEnvelope {
    type Error = String;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        match (raw.ok, raw.error) {
            (true, _) => Ok(WireEnvelope::Success {
                data: raw.data.unwrap_or(Value::Null),
            }),
            (false, Some(error)) => Ok(WireEnvelope::Failure(error)),
            (false, None) => Err("failure envelope without `error`".to_string()),
        }
    }
}
