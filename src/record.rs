//! Record timestamps and the pluggable encoder boundary.
//!
//! The engine never inspects encoded chunk bytes once they leave the
//! encoder; it only concatenates them. [`RecordEncoder`] is the seam a
//! production deployment swaps out for its own wire format (e.g.
//! MessagePack, matching the original source's per-record `[timestamp,
//! record]` array).

use serde_json::Value;

/// A record timestamp: either whole seconds, or an event-time pair with
/// nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Seconds since the Unix epoch.
    Seconds(i64),
    /// Event-time: seconds plus a nanosecond offset.
    EventTime {
        /// Seconds since the Unix epoch.
        seconds: i64,
        /// Nanosecond offset within the second.
        nanos: u32,
    },
}

impl Timestamp {
    /// Build a plain seconds timestamp.
    pub fn from_seconds(seconds: i64) -> Self {
        Timestamp::Seconds(seconds)
    }

    /// Build an event-time timestamp.
    pub fn from_event_time(seconds: i64, nanos: u32) -> Self {
        Timestamp::EventTime { seconds, nanos }
    }
}

/// Turns a `(tag, timestamp, record)` triple into the bytes appended to a
/// tag's chunk. Implementations must be self-delimiting: the engine
/// concatenates the output of successive calls with no separator, so a
/// decoder on the far end must be able to find each record's boundary
/// from the bytes alone.
pub trait RecordEncoder: Send + Sync {
    /// Encode one record. `tag` is provided for encoders whose wire format
    /// is tag-dependent; the default encoder ignores it.
    fn encode(&self, tag: &str, timestamp: Timestamp, record: &Value) -> Vec<u8>;

    /// Encode just the timestamp header, in the same format `encode` would
    /// have produced for it. The engine calls this for a caller that
    /// bypasses record-map encoding but still needs the standard
    /// `[timestamp, record]` payload shape; the default implementation is
    /// the fixed header `DefaultRecordEncoder` also uses.
    fn encode_timestamp(&self, timestamp: Timestamp) -> Vec<u8> {
        encode_timestamp_header(timestamp)
    }
}

fn encode_timestamp_header(timestamp: Timestamp) -> Vec<u8> {
    let mut out = Vec::new();
    match timestamp {
        Timestamp::Seconds(secs) => {
            out.push(TIMESTAMP_KIND_SECONDS);
            out.extend_from_slice(&secs.to_be_bytes());
        }
        Timestamp::EventTime { seconds, nanos } => {
            out.push(TIMESTAMP_KIND_EVENT_TIME);
            out.extend_from_slice(&seconds.to_be_bytes());
            out.extend_from_slice(&nanos.to_be_bytes());
        }
    }
    out
}

/// Out-of-the-box [`RecordEncoder`]: a small fixed header describing the
/// timestamp, followed by the record map encoded as a length-prefixed
/// sequence of key/value byte strings (values are the JSON text of the
/// value, which keeps the encoder free of a dependency on any one
/// mapping's shape).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRecordEncoder;

const TIMESTAMP_KIND_SECONDS: u8 = 0;
const TIMESTAMP_KIND_EVENT_TIME: u8 = 1;

impl RecordEncoder for DefaultRecordEncoder {
    fn encode(&self, _tag: &str, timestamp: Timestamp, record: &Value) -> Vec<u8> {
        let mut out = encode_timestamp_header(timestamp);

        let entries: Vec<(&String, &Value)> = match record.as_object() {
            Some(map) => map.iter().collect(),
            None => {
                // Non-map records (a raw value) are encoded under an empty key.
                Vec::new()
            }
        };

        write_u32(&mut out, entries.len() as u32);
        for (key, value) in entries {
            write_bytes(&mut out, key.as_bytes());
            let value_bytes = serde_json::to_vec(value).unwrap_or_default();
            write_bytes(&mut out, &value_bytes);
        }

        if record.as_object().is_none() {
            // Preserve non-map records verbatim after the (empty) entry count.
            let value_bytes = serde_json::to_vec(record).unwrap_or_default();
            write_bytes(&mut out, &value_bytes);
        }

        out
    }
}

fn write_u32(out: &mut Vec<u8>, n: u32) {
    out.extend_from_slice(&n.to_be_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_timestamp_and_map() {
        let encoder = DefaultRecordEncoder;
        let record = json!({"k": "v"});
        let bytes = encoder.encode("web.access", Timestamp::from_seconds(1_700_000_000), &record);

        assert_eq!(bytes[0], TIMESTAMP_KIND_SECONDS);
        assert_eq!(&bytes[1..9], &1_700_000_000i64.to_be_bytes());
    }

    #[test]
    fn encoding_is_deterministic_for_same_input() {
        let encoder = DefaultRecordEncoder;
        let record = json!({"a": 1, "b": 2});
        let a = encoder.encode("t", Timestamp::from_seconds(1), &record);
        let b = encoder.encode("t", Timestamp::from_seconds(1), &record);
        assert_eq!(a, b);
    }

    #[test]
    fn event_time_header_is_longer_than_seconds_header() {
        let encoder = DefaultRecordEncoder;
        let record = json!({});
        let secs = encoder.encode("t", Timestamp::from_seconds(1), &record);
        let evt = encoder.encode("t", Timestamp::from_event_time(1, 500), &record);
        assert_eq!(evt.len(), secs.len() + 4);
    }
}
