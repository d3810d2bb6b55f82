//! The session-server hash: Java's signed-hex SHA-1.

use num_bigint::BigInt;
use sha1::{Digest, Sha1};

/// SHA-1 over `server_id ‖ shared_secret ‖ public_key`, rendered the way
/// Java's `BigInteger(digest).toString(16)` does: the digest is taken as a
/// signed big-endian number, so a high leading bit yields a negated
/// magnitude with a `-` prefix, and leading zeroes never appear.
pub fn server_hash(server_id: &str, shared_secret: &[u8], public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key);
    let digest = hasher.finalize();
    format!("{:x}", BigInt::from_signed_bytes_be(&digest))
}
