//! Decoders for the record layouts found on the external log.
//!
//! The layout is a per-deployment contract, picked with
//! [`RecordSchema`](flowly_core::config::RecordSchema). Malformed entries
//! inside an otherwise valid record are skipped with a warning; only a record
//! that cannot be parsed at all is an error.

use std::collections::BTreeMap;

use flowly_core::config::RecordSchema;
use flowly_protocol::{ip_node_id, Address, Edge};
use serde::Deserialize;
use tracing::warn;

use crate::error::IngestError;

/// Edges and node names extracted from one record.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DecodedRecord {
    pub pings: Vec<Edge>,
    /// Node id → human-readable name.
    pub names: BTreeMap<String, String>,
    /// Entries dropped because they were malformed or incomplete.
    pub skipped: u64,
}

pub trait RecordDecoder: Send + Sync {
    fn schema(&self) -> RecordSchema;

    /// Cheap check run before a full decode.
    fn accepts(&self, record: &[u8]) -> bool;

    fn decode(&self, record: &[u8]) -> Result<DecodedRecord, IngestError>;
}

pub fn decoder_for(schema: RecordSchema) -> Box<dyn RecordDecoder> {
    match schema {
        RecordSchema::Endpoint => Box::new(EndpointDecoder),
        RecordSchema::Capture => Box::new(CaptureDecoder),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// ── endpoint schema ────────────────────────────────────────────────────────
//
// { "Timestamp": 1, "DurationInMillis": 1000,
//   "ServicePackages": [ { "Source": {"Name":"lb","IP":"10.0.0.1","Port":80},
//                          "Destination": {...}, "Len": 3, "Packages": 1 } ] }

#[derive(Deserialize)]
struct EndpointRecord {
    #[serde(rename = "DurationInMillis", default)]
    duration: u32,
    /// Kept raw so one malformed entry does not sink the whole record.
    #[serde(rename = "ServicePackages", default)]
    packages: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ServicePackage {
    #[serde(rename = "Source", default)]
    source: Option<Endpoint>,
    #[serde(rename = "Destination", default)]
    target: Option<Endpoint>,
    #[serde(rename = "Len", default)]
    len: i64,
}

#[derive(Deserialize, Default)]
struct Endpoint {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "IP", default)]
    ip: Option<String>,
}

impl Endpoint {
    fn into_parts(self) -> (String, String) {
        (self.ip.unwrap_or_default(), self.name.unwrap_or_default())
    }
}

/// Service packages between named endpoints.
pub struct EndpointDecoder;

impl RecordDecoder for EndpointDecoder {
    fn schema(&self) -> RecordSchema {
        RecordSchema::Endpoint
    }

    fn accepts(&self, record: &[u8]) -> bool {
        contains(record, br#""Source""#)
    }

    fn decode(&self, record: &[u8]) -> Result<DecodedRecord, IngestError> {
        let content: EndpointRecord = serde_json::from_slice(record)?;
        let mut out = DecodedRecord::default();

        for entry in content.packages {
            let package: ServicePackage = match serde_json::from_value(entry) {
                Ok(package) => package,
                Err(e) => {
                    warn!(error = %e, "malformed service package");
                    out.skipped += 1;
                    continue;
                }
            };

            let (source_ip, source_name) = package.source.unwrap_or_default().into_parts();
            let (target_ip, target_name) = package.target.unwrap_or_default().into_parts();
            if source_ip.is_empty() || target_ip.is_empty() {
                warn!("service package without source or target ip");
                out.skipped += 1;
                continue;
            }
            let len = match u32::try_from(package.len) {
                Ok(len) if len > 0 => len,
                _ => {
                    warn!(source = %source_ip, target = %target_ip, len = package.len, "service package has no usable length");
                    out.skipped += 1;
                    continue;
                }
            };

            let source = ip_node_id(&source_ip);
            let target = ip_node_id(&target_ip);
            out.pings.push(Edge::new(&source, &target, len, content.duration));

            for (id, name) in [(source, source_name), (target, target_name)] {
                if !name.is_empty() {
                    out.names.insert(id, name);
                }
            }
        }
        Ok(out)
    }
}

// ── capture schema ─────────────────────────────────────────────────────────
//
// { "Type": "capture", "Start": 1, "Duration": 1000,
//   "Packets": [ { "Source": "10.0.0.1:80", "Target": "10.0.0.2:9042", "Bytes": 512 } ] }

const CAPTURE_TYPE: &str = "capture";

#[derive(Deserialize)]
struct CaptureGroup {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Duration", default)]
    duration: u32,
    #[serde(rename = "Packets", default)]
    packets: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawCapture {
    #[serde(rename = "Source", default)]
    source: String,
    #[serde(rename = "Target", default)]
    target: String,
    #[serde(rename = "Bytes", default)]
    bytes: i64,
}

/// Flattened capture groups with `"ip:port"` addresses.
pub struct CaptureDecoder;

impl RecordDecoder for CaptureDecoder {
    fn schema(&self) -> RecordSchema {
        RecordSchema::Capture
    }

    fn accepts(&self, record: &[u8]) -> bool {
        contains(record, br#""Packets""#)
    }

    fn decode(&self, record: &[u8]) -> Result<DecodedRecord, IngestError> {
        let group: CaptureGroup = serde_json::from_slice(record)?;
        if group.kind != CAPTURE_TYPE {
            return Err(IngestError::UnexpectedType(group.kind));
        }

        let mut out = DecodedRecord::default();
        for entry in group.packets {
            let packet: RawCapture = match serde_json::from_value(entry) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!(error = %e, "malformed capture");
                    out.skipped += 1;
                    continue;
                }
            };
            let addresses = packet
                .source
                .parse::<Address>()
                .and_then(|s| packet.target.parse::<Address>().map(|t| (s, t)));
            let (source, target) = match addresses {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "capture with malformed address");
                    out.skipped += 1;
                    continue;
                }
            };
            let bytes = match u32::try_from(packet.bytes) {
                Ok(bytes) if bytes > 0 => bytes,
                _ => {
                    warn!(%source, %target, bytes = packet.bytes, "capture has no usable byte count");
                    out.skipped += 1;
                    continue;
                }
            };
            out.pings.push(Edge::new(source.node_id(), target.node_id(), bytes, group.duration));
        }
        Ok(out)
    }
}
