//! City-based partition routing
//!
//! The routing table is fixed when the router is built: partition `i` serves
//! the `i`-th city. Any city not in the table goes to [`DEFAULT_PARTITION`] so
//! that valid but unclassifiable events are still consumed.

use std::sync::Arc;

use crate::models::TransactionPayload;

/// Partition for cities missing from the table
pub const DEFAULT_PARTITION: i32 = 0;

/// Cities served by the production topic, in partition order
pub const DEFAULT_CITIES: [&str; 4] = ["Montréal", "Toronto", "Vancouver", "Calgary"];

const UNKNOWN_CITY: &str = "unknown";

/// Maps a city to its partition. Cheap to clone; clones share the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRouter {
    cities: Arc<[String]>,
}

impl PartitionRouter {
    pub fn new<I, S>(cities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cities: cities.into_iter().map(Into::into).collect(),
        }
    }

    /// Partition for `city`. Total and deterministic.
    pub fn route(&self, city: &str) -> i32 {
        self.cities
            .iter()
            .position(|known| known == city)
            .map(|index| index as i32)
            .unwrap_or(DEFAULT_PARTITION)
    }

    /// Partition for a serialized payload, read from its `city` field.
    ///
    /// Unparseable payloads and payloads without a city use the default partition.
    pub fn route_payload(&self, raw: &str) -> i32 {
        TransactionPayload::parse(raw)
            .ok()
            .and_then(|payload| payload.city)
            .map(|city| self.route(&city))
            .unwrap_or(DEFAULT_PARTITION)
    }

    /// City label for a partition, for log lines
    pub fn city_for_partition(&self, partition: i32) -> &str {
        usize::try_from(partition)
            .ok()
            .and_then(|index| self.cities.get(index))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CITY)
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }
}

impl Default for PartitionRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CITIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_router() -> PartitionRouter {
        PartitionRouter::new(["CityA", "CityB", "CityC", "CityD"])
    }

    #[test]
    fn test_fixed_table() {
        let router = test_router();
        assert_eq!(router.route("CityA"), 0);
        assert_eq!(router.route("CityB"), 1);
        assert_eq!(router.route("CityC"), 2);
        assert_eq!(router.route("CityD"), 3);
    }

    #[test]
    fn test_unknown_city_uses_default_partition() {
        let router = test_router();
        assert_eq!(router.route("UnknownCity"), DEFAULT_PARTITION);
        assert_eq!(router.route(""), DEFAULT_PARTITION);
        // Case-sensitive match
        assert_eq!(router.route("citya"), DEFAULT_PARTITION);
    }

    #[test]
    fn test_routing_is_stable_across_calls_and_clones() {
        let router = test_router();
        let rebuilt = test_router();
        for city in ["CityA", "CityB", "CityC", "CityD", "Elsewhere"] {
            let first = router.route(city);
            for _ in 0..100 {
                assert_eq!(router.route(city), first);
            }
            assert_eq!(router.clone().route(city), first);
            assert_eq!(rebuilt.route(city), first);
        }
    }

    #[test]
    fn test_route_payload() {
        let router = test_router();
        assert_eq!(router.route_payload(r#"{"city":"CityC","amount":1}"#), 2);
        assert_eq!(router.route_payload(r#"{"ville":"CityD"}"#), 3);
        assert_eq!(router.route_payload(r#"{"amount":1}"#), DEFAULT_PARTITION);
        assert_eq!(router.route_payload("garbage"), DEFAULT_PARTITION);
    }

    #[test]
    fn test_route_payload_ignores_unrelated_field_types() {
        let router = test_router();
        assert_eq!(
            router.route_payload(r#"{"client":123,"city":"CityB","amount":10}"#),
            1
        );
        assert_eq!(
            router.route_payload(r#"{"city":"CityB","amount":10,"type":7}"#),
            1
        );
        assert_eq!(
            router.route_payload(r#"{"city":"CityB","ville":"CityB","amount":10}"#),
            1
        );
    }

    #[test]
    fn test_default_table() {
        let router = PartitionRouter::default();
        assert_eq!(router.route("Montréal"), 0);
        assert_eq!(router.route("Toronto"), 1);
        assert_eq!(router.route("Vancouver"), 2);
        assert_eq!(router.route("Calgary"), 3);
    }

    #[test]
    fn test_city_for_partition() {
        let router = test_router();
        assert_eq!(router.city_for_partition(1), "CityB");
        assert_eq!(router.city_for_partition(7), "unknown");
        assert_eq!(router.city_for_partition(-1), "unknown");
    }
}
