//! Read-only snapshot of registry internals for debugging.

use std::collections::BTreeMap;

use serde::Serialize;
use syncdeck_types::{SourceKind, SourceState};

#[derive(Debug, Clone, Serialize)]
pub struct RegistryInspection {
    pub sources: BTreeMap<String, SourceInspection>,
    /// Live and not-yet-evicted cache keys, rendered as `id` or `id?{params}`.
    pub cache_keys: Vec<String>,
    pub in_flight: Vec<String>,
    pub polling: Vec<String>,
    pub disposed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceInspection {
    pub kind: SourceKind,
    pub endpoint: String,
    pub state: SourceState,
}
