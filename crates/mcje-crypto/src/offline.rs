//! Offline-mode player UUIDs.

use uuid::Uuid;

/// UUID v3 over `OfflinePlayer:<name>`: the MD5 of those bytes with the
/// version and variant nibbles patched in.
pub fn offline_uuid(username: &str) -> Uuid {
    let digest = md5::compute(format!("OfflinePlayer:{username}"));
    let mut bytes: [u8; 16] = digest.0;
    bytes[6] = (bytes[6] & 0x0f) | 0x30; // version 3
    bytes[8] = (bytes[8] & 0x3f) | 0x80; // RFC 4122 variant
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steve() {
        assert_eq!(
            offline_uuid("Steve").to_string(),
            "5627dd98-e6be-3c21-b8a8-e92344183641"
        );
    }

    #[test]
    fn notch() {
        assert_eq!(
            offline_uuid("Notch").to_string(),
            "b50ad385-829d-3141-a216-7e7d7539ba7f"
        );
    }

    #[test]
    fn version_and_variant_nibbles() {
        let uuid = offline_uuid("AnyName");
        assert_eq!(uuid.get_version_num(), 3);
        let s = uuid.to_string();
        // 19th hex character carries the variant: one of 8, 9, a, b.
        let variant = s.as_bytes()[19];
        assert!(matches!(variant, b'8' | b'9' | b'a' | b'b'), "got {variant}");
    }

    #[test]
    fn case_sensitive() {
        assert_ne!(offline_uuid("steve"), offline_uuid("Steve"));
    }
}
