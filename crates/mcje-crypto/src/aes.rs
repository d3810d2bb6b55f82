//! AES-128-CFB8 packet encryption.

use aes::Aes128;
use cfb8::cipher::generic_array::GenericArray;
use cfb8::cipher::KeyIvInit;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut};
use cfb8::{Decryptor, Encryptor};

/// Stateful stream cipher pair for one connection.
///
/// The 16-byte shared secret doubles as key and IV. Cipher state is
/// continuous across packets — each frame continues the stream from where
/// the previous one left off, with separate state per direction. Once
/// installed the pair lives for the rest of the session.
pub struct PacketCipher {
    encryptor: Encryptor<Aes128>,
    decryptor: Decryptor<Aes128>,
}

impl PacketCipher {
    /// Create a cipher pair from the negotiated shared secret.
    pub fn new(secret: &[u8; 16]) -> Self {
        Self {
            encryptor: Encryptor::<Aes128>::new(secret.into(), secret.into()),
            decryptor: Decryptor::<Aes128>::new(secret.into(), secret.into()),
        }
    }

    /// Encrypt outbound bytes in place.
    ///
    /// CFB8 has 8-bit feedback, so each byte is its own block; processing
    /// byte-by-byte keeps the cipher state exact across arbitrary splits.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let mut block = GenericArray::clone_from_slice(std::slice::from_ref(byte));
            self.encryptor.encrypt_block_mut(&mut block);
            *byte = block[0];
        }
    }

    /// Decrypt inbound bytes in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let mut block = GenericArray::clone_from_slice(std::slice::from_ref(byte));
            self.decryptor.decrypt_block_mut(&mut block);
            *byte = block[0];
        }
    }
}

impl std::fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PacketCipher")
    }
}
