//! ID generation utilities for Routebook
//!
//! Provides functions for generating unique identifiers for bundles and routes.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a unique bundle ID
///
/// Format: `bnd-{timestamp_ms}-{random_hex}`
/// Example: `bnd-1738300800123-a1b2c3d4`
pub fn generate_bundle_id() -> String {
    let random: u32 = rand::rng().random();
    format!("bnd-{}-{:08x}", now_ms(), random)
}

/// Generate a unique route ID
///
/// Format: `rt-{timestamp_ms}-{random_hex}`
pub fn generate_route_id() -> String {
    let random: u32 = rand::rng().random();
    format!("rt-{}-{:08x}", now_ms(), random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000);
        assert!(ts < 4102444800000);
    }

    #[test]
    fn test_generate_bundle_id_format() {
        let id = generate_bundle_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "bnd");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_route_id_format() {
        let id = generate_route_id();
        assert!(id.starts_with("rt-"));
        assert_eq!(id.split('-').count(), 3);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: std::collections::HashSet<String> = (0..100).map(|_| generate_route_id()).collect();
        assert_eq!(ids.len(), 100);
    }
}
