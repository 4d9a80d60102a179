//! Shared cache types: error enum and node identity
//!
//! The error enum is the single caller-facing failure type for every cache
//! operation. Admission denials are deliberately NOT errors; a denied
//! near-cache admit still leaves the overall operation successful.

use std::fmt;

use uuid::Uuid;

/// Cache operation error types
///
/// Transient backend failures and codec failures surface to callers;
/// configuration failures are fatal at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Transient authoritative-store failure (I/O, throttling)
    Backend(String),
    /// Value could not be encoded for the authoritative store
    Serialization(String),
    /// Stored bytes could not be decoded back into a value
    Deserialization(String),
    /// Invalid configuration, rejected at construction
    Configuration(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Backend(msg) => write!(f, "backend error: {}", msg),
            CacheError::Serialization(msg) => write!(f, "serialization error: {}", msg),
            CacheError::Deserialization(msg) => write!(f, "deserialization error: {}", msg),
            CacheError::Configuration(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl CacheError {
    /// Create transient backend error
    #[inline]
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create serialization error
    #[inline]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create deserialization error
    #[inline]
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Create configuration error
    #[inline]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether retrying the operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Backend(_))
    }
}

/// Stable, unique identifier of this process
///
/// Stamped into every write's envelope so the change-feed consumer can
/// suppress events that echo this node's own writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a fresh node identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// View the identity as the string embedded in envelopes
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an envelope source string refers to this node
    ///
    /// An empty source means unknown origin and never matches.
    pub fn matches(&self, source: &str) -> bool {
        !source.is_empty() && self.0 == source
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
