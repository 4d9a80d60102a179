//! Cache tier implementations: local map, slot-guarded near cache, and the
//! authoritative global store client

pub mod global;
pub mod local;
pub mod near;
