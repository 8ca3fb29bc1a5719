//! Fetch options, results and per-source runtime state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{current_timestamp_ms, Params};

/// Per-call options for a fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    /// Merged over the source's configured params; call-time values win.
    pub params: Params,
    /// Skip the cache and always go to the transport.
    pub force: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that bypass the cache.
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Result of a fetch.
///
/// Read-path failures are reported here rather than as errors, so callers
/// always branch on `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix timestamp in milliseconds when the response was produced.
    pub timestamp: u64,
    /// Served from the response cache without touching the transport.
    #[serde(default)]
    pub cached: bool,
    /// Wall time spent in the fetch pipeline, retries included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl FetchResponse {
    pub fn success(data: Value, latency_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: current_timestamp_ms(),
            cached: false,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn cached(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: current_timestamp_ms(),
            cached: true,
            latency_ms: None,
        }
    }

    pub fn failure(error: impl Into<String>, latency_ms: Option<u64>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            timestamp: current_timestamp_ms(),
            cached: false,
            latency_ms,
        }
    }

    /// Deserialize the payload into a concrete type.
    ///
    /// Returns `None` for failed responses.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data.clone().map(serde_json::from_value)
    }
}

/// Runtime status of a registered source.
///
/// Only the fetch pipeline mutates this; UIs read it for spinners and badges.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceState {
    pub loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<u64>,
    pub fetch_count: u64,
    /// Total failures since registration.
    pub error_count: u64,
    /// Failures since the last success; drives the retry budget.
    pub consecutive_errors: u32,
}

impl SourceState {
    /// Record a successful fetch.
    pub fn record_success(&mut self, at: u64) {
        self.loading = false;
        self.error = None;
        self.last_fetch = Some(at);
        self.last_success = Some(at);
        self.fetch_count += 1;
        self.consecutive_errors = 0;
    }

    /// Record a failed fetch and return the number of consecutive failures.
    pub fn record_failure(&mut self, error: impl Into<String>, at: u64) -> u32 {
        self.loading = false;
        self.error = Some(error.into());
        self.last_fetch = Some(at);
        self.error_count += 1;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.consecutive_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_then_success_resets_consecutive_but_not_total() {
        let mut state = SourceState::default();
        state.loading = true;

        assert_eq!(state.record_failure("boom", 1), 1);
        assert_eq!(state.record_failure("boom", 2), 2);
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert!(!state.loading);

        state.record_success(3);
        assert_eq!(state.consecutive_errors, 0);
        assert_eq!(state.error_count, 2);
        assert_eq!(state.fetch_count, 1);
        assert_eq!(state.last_success, Some(3));
        assert!(state.error.is_none());
    }

    #[test]
    fn data_as_deserializes_payload() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Kpi {
            name: String,
            value: f64,
        }

        let response = FetchResponse::success(json!({"name": "mrr", "value": 12.5}), 3);
        let kpi: Kpi = response.data_as().unwrap().unwrap();
        assert_eq!(kpi, Kpi { name: "mrr".into(), value: 12.5 });

        let failed = FetchResponse::failure("nope", None);
        assert!(failed.data_as::<Kpi>().is_none());
    }

    #[test]
    fn cached_responses_are_flagged() {
        let response = FetchResponse::cached(json!([1, 2]));
        assert!(response.success);
        assert!(response.cached);
        assert!(response.latency_ms.is_none());
    }

    #[test]
    fn options_builder_merges_params() {
        let options = FetchOptions::forced().param("page", 2).param("q", "growth");
        assert!(options.force);
        assert_eq!(options.params.get("page"), Some(&json!(2)));
        assert_eq!(options.params.len(), 2);
    }
}
