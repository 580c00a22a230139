use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherOptions {
    /// HTTP status of a payload that is not valid JSON.
    pub parse_error_status: u16,
    /// HTTP status of a request that violates the envelope rules.
    pub invalid_request_status: u16,
    /// HTTP status when no service, method or overload matches.
    pub method_not_found_status: u16,
    /// Serialization depth applied when a request carries no `#deep`. `0` is unlimited.
    pub default_depth: usize,
    /// Process batch items concurrently. Response order is preserved either way.
    pub concurrent_batch: bool,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            parse_error_status: 400,
            invalid_request_status: 400,
            method_not_found_status: 500,
            default_depth: 0,
            concurrent_batch: false,
        }
    }
}
