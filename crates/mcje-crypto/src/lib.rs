//! Cryptography for the Java Edition login path: the AES-128-CFB8 stream
//! cipher pair, RSA key exchange, the session-server hash, and offline-mode
//! UUIDs.

mod aes;
mod hash;
mod offline;
mod rsa_key;

pub use aes::PacketCipher;
pub use hash::server_hash;
pub use offline::offline_uuid;
pub use rsa_key::{encrypt_pkcs1, generate_shared_secret, parse_public_key};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("malformed server public key: {0}")]
    InvalidPublicKey(String),

    #[error("RSA encryption failed: {0}")]
    RsaEncrypt(String),
}
