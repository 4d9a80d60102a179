//! Envelope codec for the authoritative store
//!
//! Every stored value travels inside an envelope stamping the writing
//! node's identity; the change-feed consumer uses the stamp to suppress
//! self-echo. Encoding is bincode's serde integration. The codec entry
//! points are stateless and safe under concurrent use from any caller.

use serde::{Deserialize, Serialize};

use crate::cache::traits::CacheValue;
use crate::cache::types::{CacheError, NodeId};

/// Wire wrapper persisted in the authoritative store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEnvelope<V> {
    /// Identity of the node that last wrote the entry; empty means
    /// unknown origin (tolerated, treated as not-self)
    pub source: String,
    /// The caller's value
    pub value: V,
}

impl<V: CacheValue> ValueEnvelope<V> {
    /// Wrap `value` with this node's identity stamp
    pub fn new(source: &NodeId, value: V) -> Self {
        Self {
            source: source.as_str().to_string(),
            value,
        }
    }

    /// Whether this envelope was written by `node`
    pub fn originated_from(&self, node: &NodeId) -> bool {
        node.matches(&self.source)
    }
}

/// Encode an envelope into stored bytes
pub fn encode_envelope<V: CacheValue>(envelope: &ValueEnvelope<V>) -> Result<Vec<u8>, CacheError> {
    bincode::serde::encode_to_vec(envelope, bincode::config::standard())
        .map_err(|e| CacheError::serialization(e.to_string()))
}

/// Decode stored bytes back into an envelope
pub fn decode_envelope<V: CacheValue>(raw: &[u8]) -> Result<ValueEnvelope<V>, CacheError> {
    bincode::serde::decode_from_slice(raw, bincode::config::standard())
        .map(|(envelope, _)| envelope)
        .map_err(|e| CacheError::deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_value_and_source() {
        let node = NodeId::generate();
        let envelope = ValueEnvelope::new(&node, "payload".to_string());
        let raw = encode_envelope(&envelope).unwrap();
        let decoded: ValueEnvelope<String> = decode_envelope(&raw).unwrap();
        assert_eq!(decoded, envelope);
        assert!(decoded.originated_from(&node));
    }

    #[test]
    fn empty_source_is_unknown_origin() {
        let envelope = ValueEnvelope {
            source: String::new(),
            value: 42u32,
        };
        let raw = encode_envelope(&envelope).unwrap();
        let decoded: ValueEnvelope<u32> = decode_envelope(&raw).unwrap();
        assert!(!decoded.originated_from(&NodeId::generate()));
        assert_eq!(decoded.value, 42);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = decode_envelope::<String>(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CacheError::Deserialization(_))));
    }
}
