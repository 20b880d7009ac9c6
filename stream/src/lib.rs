//! Framed, encrypted message transport over arbitrary byte streams.
//!
//! # Design
//!
//! Messages are exchanged as length-delimited frames (a 4-byte big-endian
//! prefix followed by the payload). Frames are delivered whole and in order,
//! which is what lets the layers above treat the connection as a message
//! pipe rather than a byte pipe.
//!
//! A [Channel] starts out in plaintext. Once a handshake has derived keys,
//! the owner calls [Channel::install] to attach an AEAD sealer and opener
//! (AES-256-GCM or ChaCha20-Poly1305, both with a 256-bit key and a 96-bit
//! nonce). Installation is atomic with respect to frame boundaries: the next
//! outbound frame is sealed with the new cipher and the next inbound frame
//! is opened with it. Calling [Channel::install] again replaces both ciphers,
//! which is how a handshake re-keys mid-stream without tearing the
//! connection.
//!
//! Nonces are seeded from a per-installation IV carried by the handshake and
//! incremented after every frame. Both peers advance their counters in
//! lockstep because frames are strictly ordered, so the nonce never needs to
//! be transmitted. A counter that exhausts its 96-bit space fails closed
//! rather than reuse a nonce under the same key.

use thiserror::Error;

mod channel;
pub use channel::{Channel, Receiver, Sender};
pub mod cipher;
pub use cipher::{Algorithm, Cipher, Iv};
pub mod frame;

/// Errors that can occur when interacting with a channel.
#[derive(Error, Debug)]
pub enum Error {
    #[error("send failed: {0}")]
    SendFailed(commonware_runtime::Error),
    #[error("send zero size")]
    SendZeroSize,
    #[error("send too large: {0}")]
    SendTooLarge(usize),
    #[error("recv failed: {0}")]
    RecvFailed(commonware_runtime::Error),
    #[error("recv too large: {0}")]
    RecvTooLarge(usize),
    #[error("stream closed")]
    StreamClosed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("nonce overflow")]
    NonceOverflow,
}
