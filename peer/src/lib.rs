//! Authenticate peers and negotiate encrypted sessions.
//!
//! # Protocol
//!
//! A client and a host establish an authenticated, encrypted session over a
//! [deskwire_stream::Channel] with a fixed message sequence:
//!
//! ```text
//! client                                host
//!   | ClientHello  ------------------->  |   ciphers offered, identity kind,
//!   |                                    |   optional ephemeral key + IV
//!   | <-------------------  ServerHello  |   one cipher chosen, IV echoed
//!   |                                    |   (ECDH ciphers installed here)
//!   | SrpIdentify  ------------------->  |   SRP only: username
//!   | <-------------  SrpServerKeyExch.  |   group, salt, B, IV
//!   | SrpClientKeyExch. -------------->  |   A, IV
//!   |                                    |   (both re-key on this boundary)
//!   | <--------------  SessionChallenge  |   offered session types, version
//!   | SessionResponse  --------------->  |   one claimed session type
//! ```
//!
//! Two authentication factors compose. If the client pinned the host's
//! long-term X25519 key, an ephemeral ECDH secret encrypts the channel from
//! `ServerHello` onward, and only the real host can follow the
//! conversation. If the client identifies via SRP-6a, a password-derived
//! secret re-keys the channel after the key exchange; the password never
//! crosses the wire, and a wrong password surfaces as the next inbound
//! frame failing to open. When both factors are used the SRP re-key mixes
//! in the ECDH key, binding the password proof to the pinned channel.
//!
//! The session key schedule is BLAKE2s-256 throughout: the ECDH key is
//! `H(shared_secret)` and the re-keyed session key is
//! `H(prior_key || srp_premaster)` (prior empty without a pinned key).
//!
//! Neither authenticator retries or times out internally: every failure is
//! terminal and surfaces exactly once as the result of the `authenticate`
//! future, and cancellation is dropping that future. Callers decide whether
//! to reconnect.

use commonware_codec::Error as CodecError;
use thiserror::Error;

pub mod client;
pub mod cpu;
mod key;
pub mod messages;
pub mod server;
pub mod srp;
pub mod x25519;

pub use messages::{Identify, Version};

/// Session type bit: control of the remote desktop.
pub const SESSION_DESKTOP_MANAGE: u32 = 1 << 0;

/// Session type bit: view-only access to the remote desktop.
pub const SESSION_DESKTOP_VIEW: u32 = 1 << 1;

/// Session type bit: file transfer.
pub const SESSION_FILE_TRANSFER: u32 = 1 << 2;

/// Errors that can occur during authentication.
#[derive(Error, Debug)]
pub enum Error {
    #[error("network failure: {0}")]
    Network(deskwire_stream::Error),
    #[error("unable to decode {0}: {1}")]
    UnableToDecode(&'static str, CodecError),
    #[error("cipher not offered or not supported: {0:#x}")]
    InvalidCipher(u32),
    #[error("iv presence mismatch")]
    IvMismatch,
    #[error("unknown srp group ({0} byte modulus)")]
    UnknownSrpGroup(usize),
    #[error("srp salt too short: {0}")]
    SaltTooShort(usize),
    #[error("srp server ephemeral too short: {0}")]
    ServerPublicTooShort(usize),
    #[error("degenerate srp public ephemeral")]
    DegeneratePublic,
    #[error("peer claimed a session type that is not a single bit: {0:#x}")]
    InvalidSessionType(u32),
    #[error("configured session type is not a single bit: {0:#x}")]
    MisconfiguredSessionType(u32),
    #[error("access denied")]
    AccessDenied,
    #[error("session type denied")]
    SessionDenied,
    #[error("anonymous identity requires a pinned host key")]
    MissingPeerKey,
    #[error("no host key available")]
    MissingHostKey,
    #[error("shared secret was not contributory")]
    SharedSecretNotContributory,
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

impl From<deskwire_stream::Error> for Error {
    fn from(err: deskwire_stream::Error) -> Self {
        match err {
            // Failing to open a frame mid-handshake means the peer's keys
            // disagree with ours, which is how a rejected credential
            // manifests (the password never crosses the wire).
            deskwire_stream::Error::DecryptionFailed => Error::AccessDenied,
            err => Error::Network(err),
        }
    }
}

/// The coarse failure taxonomy reported to callers. Success is the `Ok`
/// branch of `authenticate`, so it has no code here.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    NetworkError,
    ProtocolError,
    AccessDenied,
    SessionDenied,
    UnknownError,
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Network(_) => ErrorCode::NetworkError,
            Error::UnableToDecode(_, _)
            | Error::InvalidCipher(_)
            | Error::IvMismatch
            | Error::UnknownSrpGroup(_)
            | Error::SaltTooShort(_)
            | Error::ServerPublicTooShort(_)
            | Error::DegeneratePublic
            | Error::InvalidSessionType(_) => ErrorCode::ProtocolError,
            Error::AccessDenied => ErrorCode::AccessDenied,
            Error::SessionDenied => ErrorCode::SessionDenied,
            Error::MisconfiguredSessionType(_)
            | Error::MissingPeerKey
            | Error::MissingHostKey
            | Error::SharedSecretNotContributory
            | Error::KeyDerivationFailed => ErrorCode::UnknownError,
        }
    }
}
