use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

pub const TYPE_TRAFFIC: &str = "traffic";
pub const TYPE_MAPPING: &str = "mapping";

/// One observed unit of traffic between two nodes.
/// Wire: `{ "source": "node-10", "target": "node-21", "count": 2, "duration": 500 }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Number of units observed.
    pub count: u32,
    /// Observation window in milliseconds.
    pub duration: u32,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, count: u32, duration: u32) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            count,
            duration,
        }
    }
}

/// Server → viewer frame. The `type` field is derived from the variant.
///
/// Wire:
/// `{ "type": "traffic", "pings": [ ... ] }`
/// `{ "type": "mapping", "mapping": { "node-10": "cs-01" } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Traffic { pings: Vec<Edge> },
    /// Viewers replace aliases with these values; no merge across frames.
    Mapping { mapping: BTreeMap<String, String> },
}

impl Message {
    pub fn traffic(pings: Vec<Edge>) -> Self {
        Message::Traffic { pings }
    }

    pub fn mapping<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Message::Mapping {
            mapping: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The wire discriminant of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Traffic { .. } => TYPE_TRAFFIC,
            Message::Mapping { .. } => TYPE_MAPPING,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(frame)?)
    }

    /// Decode a frame that must also be valid UTF-8 text, returning both the
    /// message and the text so the original bytes can be forwarded verbatim.
    pub fn decode_text(frame: &[u8]) -> Result<(&str, Self), ProtocolError> {
        let text = std::str::from_utf8(frame).map_err(|_| ProtocolError::NotUtf8)?;
        let message = serde_json::from_str(text)?;
        Ok((text, message))
    }
}
