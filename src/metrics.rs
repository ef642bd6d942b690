use std::sync::Mutex;

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

const DEFAULT_SERVICE: &str = "cache_manager";
const NAMESPACE: &str = "range_cache";

// Allow the SERVICE to be dynamically configurable
lazy_static! {
    static ref SERVICE: Mutex<String> = Mutex::new(DEFAULT_SERVICE.to_string());
}

pub const STATUS_HIT: &str = "hit";
pub const STATUS_MISS: &str = "miss";

lazy_static! {
    pub static ref CACHE_REQUESTS: IntCounterVec = register_int_counter_vec!(
        prefix_name(NAMESPACE, "request_count").as_str(),
        "count of cache read requests broken down by outcome",
        &["status"]
    )
    .unwrap();
    pub static ref REJECTED_WRITES: IntCounter = register_int_counter!(
        prefix_name(NAMESPACE, "rejected_write_count").as_str(),
        "count of writes dropped by the in-flight memory budget"
    )
    .unwrap();
    pub static ref FLUSH_ERROR_COUNT: IntCounter = register_int_counter!(
        prefix_name(NAMESPACE, "flush_error_count").as_str(),
        "count of flush tasks abandoned due to an I/O error"
    )
    .unwrap();
    pub static ref EVICTED_ENTRIES: IntCounter = register_int_counter!(
        prefix_name(NAMESPACE, "evicted_entry_count").as_str(),
        "count of remote files whose cached ranges were evicted"
    )
    .unwrap();
    pub static ref INFLIGHT_BYTES: IntGauge = register_int_gauge!(
        prefix_name(NAMESPACE, "inflight_bytes").as_str(),
        "bytes retained in memory by admitted but not-yet-flushed writes"
    )
    .unwrap();
}

fn prefix_name(namespace: &str, name: &str) -> String {
    let service = SERVICE
        .lock()
        .expect("Couldn't get service name for cache metrics");
    format!("{service}_{namespace}_{name}")
}

/// Sets the name for the "service" field of cache metrics. Needs to be set as
/// part of application startup before cache metrics are initialized.
pub fn set_metrics_service_name(service_name: String) {
    let mut contents = SERVICE
        .lock()
        .expect("FATAL: couldn't lock cache metrics service name");
    *contents = service_name;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_prefix() {
        set_metrics_service_name("storage_node".to_string());
        assert_eq!(
            prefix_name(NAMESPACE, "request_count"),
            "storage_node_range_cache_request_count"
        );
    }
}
