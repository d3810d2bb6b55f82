//! RSA key exchange: parse the server's DER public key and wrap the shared
//! secret / verify token with PKCS#1 v1.5.

use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};

use crate::CryptoError;

/// Parse the X.509 SubjectPublicKeyInfo DER blob from `encryption_begin`.
pub fn parse_public_key(der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(der)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// RSA-PKCS1-v1.5 encrypt `data` with the server key.
pub fn encrypt_pkcs1(key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut rng = rand::thread_rng();
    key.encrypt(&mut rng, Pkcs1v15Encrypt, data)
        .map_err(|e| CryptoError::RsaEncrypt(e.to_string()))
}

/// Sixteen random bytes for the AES key/IV.
pub fn generate_shared_secret() -> [u8; 16] {
    rand::random()
}
