//! AEAD ciphers installable on a [crate::Channel].

use crate::Error;
use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305,
};

/// Size of an AEAD key in bytes (256 bits, both algorithms).
pub const KEY_SIZE: usize = 32;

/// Size of an AEAD nonce in bytes (96 bits, both algorithms).
pub const IV_SIZE: usize = 12;

/// Size of the authentication tag appended to every sealed frame.
pub const TAG_SIZE: usize = 16;

/// AEAD algorithm negotiated by a handshake.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Algorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
}

/// A 96-bit nonce advanced as a big-endian counter after every frame.
///
/// Seeded from the IV exchanged during a handshake. Peers never transmit
/// nonces: frames are strictly ordered, so both sides advance in lockstep.
/// Once the counter carries off the top of the 96-bit space it is
/// exhausted and refuses to produce further values; reusing a nonce under
/// the same key would void the AEAD guarantees.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Iv {
    bytes: [u8; IV_SIZE],
    exhausted: bool,
}

impl Iv {
    pub fn new(bytes: [u8; IV_SIZE]) -> Self {
        Self {
            bytes,
            exhausted: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.bytes
    }

    /// The nonce for the next frame. Fails once the counter is exhausted.
    fn current(&self) -> Result<[u8; IV_SIZE], Error> {
        if self.exhausted {
            return Err(Error::NonceOverflow);
        }
        Ok(self.bytes)
    }

    /// Increment by one, carrying right-to-left. Saturates into the
    /// exhausted state instead of wrapping back to a value already used.
    fn inc(&mut self) {
        for byte in self.bytes.iter_mut().rev() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                return;
            }
        }
        self.exhausted = true;
    }
}

impl From<[u8; IV_SIZE]> for Iv {
    fn from(bytes: [u8; IV_SIZE]) -> Self {
        Self::new(bytes)
    }
}

enum Keyed {
    Aes256Gcm(Box<Aes256Gcm>),
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
}

/// One direction of an encrypted channel: an AEAD instance bound to a key
/// and a nonce counter. The counter advances exactly once per successfully
/// sealed or opened frame.
pub struct Cipher {
    keyed: Keyed,
    iv: Iv,
}

impl Cipher {
    pub fn new(algorithm: Algorithm, key: &[u8; KEY_SIZE], iv: Iv) -> Self {
        let keyed = match algorithm {
            Algorithm::Aes256Gcm => Keyed::Aes256Gcm(Box::new(Aes256Gcm::new(key.into()))),
            Algorithm::ChaCha20Poly1305 => {
                Keyed::ChaCha20Poly1305(Box::new(ChaCha20Poly1305::new(key.into())))
            }
        };
        Self { keyed, iv }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self.keyed {
            Keyed::Aes256Gcm(_) => Algorithm::Aes256Gcm,
            Keyed::ChaCha20Poly1305(_) => Algorithm::ChaCha20Poly1305,
        }
    }

    /// Seal a plaintext frame, appending the authentication tag. Fails
    /// once the nonce counter is exhausted.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = self.iv.current()?;
        let sealed = match &self.keyed {
            Keyed::Aes256Gcm(aead) => aead
                .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
                .map_err(|_| Error::EncryptionFailed)?,
            Keyed::ChaCha20Poly1305(aead) => aead
                .encrypt(chacha20poly1305::Nonce::from_slice(&nonce), plaintext)
                .map_err(|_| Error::EncryptionFailed)?,
        };
        self.iv.inc();
        Ok(sealed)
    }

    /// Open a sealed frame, verifying the authentication tag. Fails once
    /// the nonce counter is exhausted.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = self.iv.current()?;
        let opened = match &self.keyed {
            Keyed::Aes256Gcm(aead) => aead
                .decrypt(aes_gcm::Nonce::from_slice(&nonce), ciphertext)
                .map_err(|_| Error::DecryptionFailed)?,
            Keyed::ChaCha20Poly1305(aead) => aead
                .decrypt(chacha20poly1305::Nonce::from_slice(&nonce), ciphertext)
                .map_err(|_| Error::DecryptionFailed)?,
        };
        self.iv.inc();
        Ok(opened)
    }
}
