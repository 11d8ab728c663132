// SPDX-License-Identifier: Apache-2.0
//! Canonical compact-JSON event log, SHA-256 hash chain, NDJSON storage,
//! and deterministic replay (§4.7).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::IntegrityError;

/// `event.hash` is 64 lowercase hex characters (SHA-256).
pub const HASH_HEX_LEN: usize = 64;

/// Genesis `prev_hash`: 64 ASCII zeros.
#[must_use]
pub fn genesis_prev_hash() -> String {
    "0".repeat(HASH_HEX_LEN)
}

/// Event-type-specific payload variants (§4.7 "Event kinds").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum EventPayload {
    /// A new session began.
    SessionStart {
        /// Configuration used, serialized as opaque JSON.
        config: serde_json::Value,
    },
    /// A session ended.
    SessionEnd,
    /// An intervention was placed.
    PlaceIntervention {
        /// Target cell index.
        cell_index: u32,
        /// Intervention kind name.
        kind: String,
    },
    /// An intervention was removed.
    RemoveIntervention {
        /// Target cell index.
        cell_index: u32,
        /// Intervention kind name.
        kind: String,
    },
    /// A runtime parameter changed.
    ChangeParameter {
        /// Dotted parameter path.
        path: String,
        /// New value, as opaque JSON.
        value: serde_json::Value,
    },
    /// A debounced camera move.
    CameraMove {
        /// New camera position/orientation, as opaque JSON.
        pose: serde_json::Value,
    },
    /// One simulation step advanced.
    SimulationStep {
        /// Sequential step number.
        step_number: u64,
        /// Time step used, in seconds.
        dt_seconds: f64,
        /// XXH3 state hash after this step, formatted as lowercase hex.
        state_hash: String,
    },
    /// A binary-snapshot checkpoint was taken.
    Checkpoint {
        /// Sequential step number.
        step_number: u64,
        /// Reference to the stored snapshot (host-defined).
        snapshot_ref: String,
        /// SHA-256 of the snapshot bytes, lowercase hex.
        snapshot_sha256: String,
    },
}

/// One canonical event record (§4.7). Field order matches the spec's
/// alphabetical key ordering exactly, which is also serde's struct-field
/// serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Sequential event id, starting from 0.
    pub event_id: u64,
    /// Event kind discriminator, duplicated at the top level for
    /// log-scanning convenience.
    pub event_type: String,
    /// SHA-256 of the canonical serialization with this field excluded,
    /// lowercase hex.
    pub hash: String,
    /// Event-type-specific payload.
    pub payload: EventPayload,
    /// Previous event's `hash`; genesis uses [`genesis_prev_hash`].
    pub prev_hash: String,
    /// Schema version, currently always 1.
    pub schema_version: u32,
    /// Session this event belongs to.
    pub session_id: Uuid,
    /// Monotonic microsecond timestamp.
    pub timestamp_us: u64,
    /// Host-supplied user identifier.
    pub user_id: String,
}

/// Current event-record schema version.
pub const SCHEMA_VERSION: u32 = 1;

fn event_type_name(payload: &EventPayload) -> &'static str {
    match payload {
        EventPayload::SessionStart { .. } => "session_start",
        EventPayload::SessionEnd => "session_end",
        EventPayload::PlaceIntervention { .. } => "place_intervention",
        EventPayload::RemoveIntervention { .. } => "remove_intervention",
        EventPayload::ChangeParameter { .. } => "change_parameter",
        EventPayload::CameraMove { .. } => "camera_move",
        EventPayload::SimulationStep { .. } => "simulation_step",
        EventPayload::Checkpoint { .. } => "checkpoint",
    }
}

/// Canonicalizes a JSON value to the wire form the hash is computed over:
/// compact (no whitespace), with every float formatted to exactly six
/// decimal places.
#[must_use]
fn canonical_json(value: &serde_json::Value) -> String {
    fn six_decimals(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) if n.is_f64() => {
                serde_json::Value::String(format!("{:.6}", n.as_f64().unwrap_or(0.0)))
            }
            serde_json::Value::Number(_) => v.clone(),
            serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(six_decimals).collect()),
            serde_json::Value::Object(map) => {
                serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), six_decimals(v))).collect())
            }
            other => other.clone(),
        }
    }
    serde_json::to_string(&six_decimals(value)).unwrap_or_default()
}

/// Appends and hash-chains a new event, given the previous event's hash
/// (or [`genesis_prev_hash`] for the first event).
#[must_use]
pub fn append_event(
    event_id: u64,
    payload: EventPayload,
    prev_hash: &str,
    session_id: Uuid,
    timestamp_us: u64,
    user_id: &str,
) -> EventRecord {
    let mut record = EventRecord {
        event_id,
        event_type: event_type_name(&payload).to_string(),
        hash: String::new(),
        payload,
        prev_hash: prev_hash.to_string(),
        schema_version: SCHEMA_VERSION,
        session_id,
        timestamp_us,
        user_id: user_id.to_string(),
    };
    record.hash = compute_hash(&record);
    record
}

/// Computes the SHA-256 hash of `record` with its own `hash` field
/// temporarily treated as excluded (emptied before hashing).
#[must_use]
pub fn compute_hash(record: &EventRecord) -> String {
    let mut unhashed = record.clone();
    unhashed.hash = String::new();
    let value = serde_json::to_value(&unhashed).unwrap_or(serde_json::Value::Null);
    let canonical = canonical_json(&value);
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// Advances a monotonic microsecond clock: returns `clock_us` unless it is
/// `<= last_timestamp_us`, in which case returns `last_timestamp_us + 1`
/// (§4.7 "Timestamping").
#[must_use]
pub fn monotonic_timestamp(clock_us: u64, last_timestamp_us: u64) -> u64 {
    if clock_us <= last_timestamp_us {
        last_timestamp_us + 1
    } else {
        clock_us
    }
}

/// Verifies the hash chain of a sequence of events: every event's stored
/// `hash` must match its recomputed hash, and `event[i].prev_hash` must
/// equal `event[i-1].hash`. Returns the index of the first broken event on
/// failure.
pub fn verify_chain(events: &[EventRecord]) -> Result<(), IntegrityError> {
    let mut expected_prev = genesis_prev_hash();
    for event in events {
        if event.prev_hash != expected_prev || compute_hash(event) != event.hash {
            return Err(IntegrityError::ChainBroken(event.event_id));
        }
        expected_prev = event.hash.clone();
    }
    Ok(())
}

/// Serializes one event as an NDJSON line (no trailing newline).
#[must_use]
pub fn to_ndjson_line(event: &EventRecord) -> String {
    serde_json::to_string(event).unwrap_or_default()
}

/// Compresses an NDJSON blob with LZ4 (optional storage mode, §4.7).
#[must_use]
pub fn compress_lz4(ndjson: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(ndjson)
}

/// Decompresses an LZ4-compressed NDJSON blob.
///
/// # Errors
/// Returns an error if the data is not valid LZ4-framed-with-size data.
pub fn decompress_lz4(compressed: &[u8]) -> Result<Vec<u8>, lz4_flex::block::DecompressError> {
    lz4_flex::decompress_size_prepended(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Uuid {
        Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap()
    }

    fn chain_of(n: u64) -> Vec<EventRecord> {
        let mut events = Vec::new();
        let mut prev = genesis_prev_hash();
        for i in 0..n {
            let event = append_event(
                i,
                EventPayload::SimulationStep { step_number: i, dt_seconds: 3600.0, state_hash: format!("{i:016x}") },
                &prev,
                session(),
                1000 + i,
                "tester",
            );
            prev = event.hash.clone();
            events.push(event);
        }
        events
    }

    #[test]
    fn untampered_chain_validates() {
        let events = chain_of(1000);
        assert!(verify_chain(&events).is_ok());
    }

    #[test]
    fn tampering_with_a_field_breaks_the_chain_from_that_point() {
        let mut events = chain_of(100);
        if let EventPayload::SimulationStep { dt_seconds, .. } = &mut events[50].payload {
            *dt_seconds += 1.0;
        }
        let err = verify_chain(&events).unwrap_err();
        assert!(matches!(err, IntegrityError::ChainBroken(50)));
    }

    #[test]
    fn monotonic_timestamp_never_goes_backward() {
        assert_eq!(monotonic_timestamp(100, 50), 100);
        assert_eq!(monotonic_timestamp(40, 50), 51);
        assert_eq!(monotonic_timestamp(50, 50), 51);
    }

    #[test]
    fn lz4_round_trips_ndjson() {
        let events = chain_of(5);
        let ndjson: String = events.iter().map(|e| to_ndjson_line(e) + "\n").collect();
        let compressed = compress_lz4(ndjson.as_bytes());
        let decompressed = decompress_lz4(&compressed).expect("valid lz4");
        assert_eq!(decompressed, ndjson.as_bytes());
    }
}
