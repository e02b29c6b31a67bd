//! Logical ID allocation
//!
//! A logical ID is the alphanumeric form of a construct path followed by the
//! first 8 hex digits (uppercase) of the SHA-256 of `<stack>/<path>`. The
//! readable prefix leaves out the stack name; the hash does not. Sanitising
//! alone could map two paths to the same ID; the hash suffix keeps them apart
//! while the prefix stays readable.

use sha2::{Digest, Sha256};

/// Longest logical ID the template format accepts
const MAX_LOGICAL_ID_LEN: usize = 255;
const HASH_LEN: usize = 8;

/// Logical ID for the construct at `path` (components below the root of `stack`)
pub fn logical_id(stack: &str, path: &[&str]) -> String {
    let human: String = path
        .iter()
        .flat_map(|component| component.chars())
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_LOGICAL_ID_LEN - HASH_LEN)
        .collect();

    let digest = Sha256::digest(format!("{}/{}", stack, path.join("/")).as_bytes());
    let suffix = hex::encode_upper(&digest[..HASH_LEN / 2]);

    format!("{}{}", human, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_id_shape() {
        let id = logical_id("web-health", &["WebHealthLambda"]);
        assert!(id.starts_with("WebHealthLambda"));
        assert_eq!(id.len(), "WebHealthLambda".len() + 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(id, logical_id("web-health", &["WebHealthLambda"]));
    }

    #[test]
    fn test_stack_name_changes_suffix_only() {
        let a = logical_id("web-health", &["WebHealthLambda"]);
        let b = logical_id("web-health-staging", &["WebHealthLambda"]);
        assert_eq!(&a[..a.len() - 8], &b[..b.len() - 8]);
        assert_ne!(a, b);

        let digest = Sha256::digest(b"web-health/WebHealthLambda");
        assert_eq!(&a[a.len() - 8..], hex::encode_upper(&digest[..4]));
    }

    #[test]
    fn test_sanitised_collisions_are_separated() {
        let a = logical_id("web-health", &["https://example.com_latency_errors"]);
        let b = logical_id("web-health", &["httpsexample.com_latencyerrors"]);
        assert_eq!(&a[..a.len() - 8], &b[..b.len() - 8]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_nested_path() {
        let id = logical_id("web-health", &["WebHealthAppLambdaRole", "DefaultPolicy"]);
        assert!(id.starts_with("WebHealthAppLambdaRoleDefaultPolicy"));
    }

    #[test]
    fn test_long_ids_are_truncated() {
        let long = "a".repeat(400);
        assert_eq!(logical_id("s", &[long.as_str()]).len(), MAX_LOGICAL_ID_LEN);
    }
}
