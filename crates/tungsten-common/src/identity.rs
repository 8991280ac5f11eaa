//! Deterministic entity id derivation
//!
//! Entity ids are not assigned externally: they are computed from the
//! identity-defining fields of the record, so two discoverers reporting the
//! same application converge on the same id. Ids are recomputed on every
//! patch; if the computed id changes, the record is a different entity and
//! must be created fresh rather than updated in place.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest
const ID_HEX_LEN: usize = 32;

/// Derive a stable entity id from its identity-defining fields.
///
/// The id is `<prefix>-<hex>` where `hex` is the truncated lowercase
/// SHA-256 of the parts joined with an unambiguous separator. Parts must
/// never include volatile fields (timestamps, connection state).
pub fn entity_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Length-prefix free separator; parts containing '\x1f' are not
        // expected from URI/enum inputs.
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(ID_HEX_LEN);
    for byte in digest.iter().take(ID_HEX_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    format!("{}-{}", prefix, hex)
}

/// Application id from its identity (scope, application type, uppercased uri)
pub fn application_id(scope: &str, application_type: &str, application_uri: &str) -> String {
    entity_id(
        "app",
        &[scope, application_type, &application_uri.to_uppercase()],
    )
}

/// Endpoint id from its identity (owning application, url, security settings)
pub fn endpoint_id(
    application_id: &str,
    endpoint_url: &str,
    security_mode: &str,
    security_policy: &str,
) -> String {
    entity_id(
        "ep",
        &[application_id, endpoint_url, security_mode, security_policy],
    )
}

/// Writer group id from its identity (site, group name)
pub fn writer_group_id(site_id: &str, name: &str) -> String {
    entity_id("wg", &[site_id, name])
}

/// Agent registration id from the (device id, module id) pair
pub fn agent_id(prefix: &str, device_id: &str, module_id: &str) -> String {
    entity_id(prefix, &[device_id, module_id])
}
