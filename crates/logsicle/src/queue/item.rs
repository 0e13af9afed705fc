use std::hash::Hasher;

use fnv::FnvHasher;
use serde_json::Value;
use tokio::time::Instant;

use crate::resource::{ResourceData, ResourceType, TIMESTAMP_FIELD};

/// A record waiting in the worker queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub data: ResourceData,
    /// Content hash used for deduplication.
    pub hash: String,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    /// Enqueue order, unique per worker.
    pub seq: u64,
    pub enqueued_at: Instant,
    encoded_len: usize,
}

impl QueueItem {
    #[must_use]
    pub fn new(data: ResourceData, seq: u64, enqueued_at: Instant) -> Self {
        let hash = generate_payload_hash(&data);
        let encoded_len = serde_json::to_vec(&data.payload).map_or(0, |bytes| bytes.len());
        Self {
            data,
            hash,
            attempts: 0,
            seq,
            enqueued_at,
            encoded_len,
        }
    }

    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.data.resource_type
    }

    /// Size of the serialized payload in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }
}

/// FNV-1a 64 over the resource type and the canonical JSON of the payload, ignoring the
/// top-level `timestamp`. Rendered as 16 lowercase hex digits.
#[must_use]
pub fn generate_payload_hash(data: &ResourceData) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(data.resource_type.as_str().as_bytes());
    hasher.write_u8(b'|');

    let mut keys: Vec<&String> = data
        .payload
        .keys()
        .filter(|key| key.as_str() != TIMESTAMP_FIELD)
        .collect();
    keys.sort_unstable();
    hasher.write_u8(b'{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            hasher.write_u8(b',');
        }
        write_json_string(&mut hasher, key);
        hasher.write_u8(b':');
        if let Some(value) = data.payload.get(key) {
            write_canonical(&mut hasher, value);
        }
    }
    hasher.write_u8(b'}');

    format!("{:016x}", hasher.finish())
}

/// Feeds `value` as JSON with object keys sorted, so map ordering never changes the digest.
fn write_canonical(hasher: &mut FnvHasher, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            hasher.write_u8(b'{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    hasher.write_u8(b',');
                }
                write_json_string(hasher, key);
                hasher.write_u8(b':');
                write_canonical(hasher, value);
            }
            hasher.write_u8(b'}');
        }
        Value::Array(values) => {
            hasher.write_u8(b'[');
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    hasher.write_u8(b',');
                }
                write_canonical(hasher, value);
            }
            hasher.write_u8(b']');
        }
        scalar => hasher.write(scalar.to_string().as_bytes()),
    }
}

fn write_json_string(hasher: &mut FnvHasher, s: &str) {
    hasher.write(Value::String(s.to_string()).to_string().as_bytes());
}
