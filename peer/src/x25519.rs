//! X25519 key plumbing for the handshake.
//!
//! The client generates a fresh [EphemeralSecret] per handshake; the host's
//! long-term identity is a [StaticSecret] whose public half clients pin
//! out-of-band.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};
use rand::{CryptoRng, Rng};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};

/// Encoded size of a public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct PublicKey {
    inner: X25519PublicKey,
}

impl PublicKey {
    pub fn from_secret(secret: &EphemeralSecret) -> Self {
        Self {
            inner: X25519PublicKey::from(secret),
        }
    }

    pub fn from_static(secret: &StaticSecret) -> Self {
        Self {
            inner: X25519PublicKey::from(secret),
        }
    }

    /// A key learned out-of-band (the pinned host key).
    pub fn from_bytes(array: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            inner: X25519PublicKey::from(array),
        }
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.inner.as_bytes()
    }
}

impl AsRef<X25519PublicKey> for PublicKey {
    fn as_ref(&self) -> &X25519PublicKey {
        &self.inner
    }
}

impl Write for PublicKey {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.inner.as_bytes());
    }
}

impl EncodeSize for PublicKey {
    fn encode_size(&self) -> usize {
        PUBLIC_KEY_SIZE
    }
}

impl Read for PublicKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        if buf.remaining() < PUBLIC_KEY_SIZE {
            return Err(CodecError::EndOfBuffer);
        }
        let mut array = [0u8; PUBLIC_KEY_SIZE];
        buf.copy_to_slice(&mut array);
        Ok(Self {
            inner: X25519PublicKey::from(array),
        })
    }
}

/// Generate a fresh per-handshake secret.
pub fn ephemeral<R: Rng + CryptoRng>(rng: &mut R) -> EphemeralSecret {
    EphemeralSecret::random_from_rng(rng)
}

/// Generate a long-term host secret.
pub fn static_secret<R: Rng + CryptoRng>(rng: &mut R) -> StaticSecret {
    StaticSecret::random_from_rng(rng)
}
