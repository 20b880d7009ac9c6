//! Wire messages exchanged during peer authentication.
//!
//! Encoding is deterministic: fixed-width big-endian integers for bitmasks,
//! varints for lengths and versions, presence flags for optional fields.
//! Variable-length fields are cap-bounded at decode time so a malicious
//! peer cannot make the parser allocate unbounded memory; semantic
//! validation (group pinning, size floors) happens in the authenticators.

use crate::x25519;
use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{varint::UInt, EncodeSize, Error as CodecError, Read, ReadExt, Write};
use deskwire_stream::cipher::IV_SIZE;
use std::fmt;

/// Cipher bit for AES-256-GCM in `ClientHello::encryption`.
pub const CIPHER_AES256_GCM: u32 = 1 << 0;

/// Cipher bit for ChaCha20-Poly1305 in `ClientHello::encryption`.
pub const CIPHER_CHACHA20_POLY1305: u32 = 1 << 1;

// Decode-time caps on variable-length fields.
const MAX_USERNAME_SIZE: usize = 256;
const MAX_MODULUS_SIZE: usize = 1024;
const MAX_GENERATOR_SIZE: usize = 8;
const MAX_SALT_SIZE: usize = 256;

fn write_bytes(buf: &mut impl BufMut, bytes: &[u8]) {
    UInt(bytes.len() as u64).write(buf);
    buf.put_slice(bytes);
}

fn bytes_size(bytes: &[u8]) -> usize {
    UInt(bytes.len() as u64).encode_size() + bytes.len()
}

fn read_bytes(buf: &mut impl Buf, max: usize, context: &'static str) -> Result<Bytes, CodecError> {
    let len: u64 = UInt::read(buf)?.into();
    if len > max as u64 {
        return Err(CodecError::Invalid(context, "length cap exceeded"));
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(CodecError::EndOfBuffer);
    }
    Ok(buf.copy_to_bytes(len))
}

fn read_iv(buf: &mut impl Buf) -> Result<[u8; IV_SIZE], CodecError> {
    if buf.remaining() < IV_SIZE {
        return Err(CodecError::EndOfBuffer);
    }
    let mut iv = [0u8; IV_SIZE];
    buf.copy_to_slice(&mut iv);
    Ok(iv)
}

/// How the client intends to prove who it is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Identify {
    /// No user identity; the pinned host key alone authenticates the peer.
    Anonymous,
    /// SRP-6a with a username and password.
    Srp,
}

impl Write for Identify {
    fn write(&self, buf: &mut impl BufMut) {
        let kind: u8 = match self {
            Identify::Anonymous => 0,
            Identify::Srp => 1,
        };
        kind.write(buf);
    }
}

impl EncodeSize for Identify {
    fn encode_size(&self) -> usize {
        1
    }
}

impl Read for Identify {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        match u8::read(buf)? {
            0 => Ok(Identify::Anonymous),
            1 => Ok(Identify::Srp),
            _ => Err(CodecError::Invalid("Identify", "unknown kind")),
        }
    }
}

/// A peer software version, reported by the server in [SessionChallenge].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Write for Version {
    fn write(&self, buf: &mut impl BufMut) {
        UInt(u64::from(self.major)).write(buf);
        UInt(u64::from(self.minor)).write(buf);
        UInt(u64::from(self.patch)).write(buf);
    }
}

impl EncodeSize for Version {
    fn encode_size(&self) -> usize {
        UInt(u64::from(self.major)).encode_size()
            + UInt(u64::from(self.minor)).encode_size()
            + UInt(u64::from(self.patch)).encode_size()
    }
}

impl Read for Version {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let major: u64 = UInt::read(buf)?.into();
        let minor: u64 = UInt::read(buf)?.into();
        let patch: u64 = UInt::read(buf)?.into();
        let component = |value: u64| {
            u32::try_from(value).map_err(|_| CodecError::Invalid("Version", "component overflow"))
        };
        Ok(Self {
            major: component(major)?,
            minor: component(minor)?,
            patch: component(patch)?,
        })
    }
}

/// First message on the wire, client to server.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientHello {
    /// Bitmask of ciphers the client is willing to use.
    pub encryption: u32,
    pub identify: Identify,
    /// The client's ephemeral X25519 key, present iff the client pinned the
    /// server's long-term key.
    pub public_key: Option<x25519::PublicKey>,
    /// IV for the client-to-server direction, present iff `public_key` is.
    pub iv: Option<[u8; IV_SIZE]>,
}

impl Write for ClientHello {
    fn write(&self, buf: &mut impl BufMut) {
        self.encryption.write(buf);
        self.identify.write(buf);
        match &self.public_key {
            Some(public_key) => {
                true.write(buf);
                public_key.write(buf);
            }
            None => false.write(buf),
        }
        match &self.iv {
            Some(iv) => {
                true.write(buf);
                buf.put_slice(iv);
            }
            None => false.write(buf),
        }
    }
}

impl EncodeSize for ClientHello {
    fn encode_size(&self) -> usize {
        self.encryption.encode_size()
            + self.identify.encode_size()
            + 1
            + self.public_key.as_ref().map_or(0, |k| k.encode_size())
            + 1
            + self.iv.map_or(0, |_| IV_SIZE)
    }
}

impl Read for ClientHello {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let encryption = u32::read(buf)?;
        let identify = Identify::read(buf)?;
        let public_key = match bool::read(buf)? {
            true => Some(x25519::PublicKey::read(buf)?),
            false => None,
        };
        let iv = match bool::read(buf)? {
            true => Some(read_iv(buf)?),
            false => None,
        };
        Ok(Self {
            encryption,
            identify,
            public_key,
            iv,
        })
    }
}

/// Server's reply to [ClientHello].
#[derive(Clone, Debug, PartialEq)]
pub struct ServerHello {
    /// Exactly one cipher bit chosen among those the client advertised.
    pub encryption: u32,
    /// IV for the server-to-client direction, echoed iff the client sent one.
    pub iv: Option<[u8; IV_SIZE]>,
}

impl Write for ServerHello {
    fn write(&self, buf: &mut impl BufMut) {
        self.encryption.write(buf);
        match &self.iv {
            Some(iv) => {
                true.write(buf);
                buf.put_slice(iv);
            }
            None => false.write(buf),
        }
    }
}

impl EncodeSize for ServerHello {
    fn encode_size(&self) -> usize {
        self.encryption.encode_size() + 1 + self.iv.map_or(0, |_| IV_SIZE)
    }
}

impl Read for ServerHello {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let encryption = u32::read(buf)?;
        let iv = match bool::read(buf)? {
            true => Some(read_iv(buf)?),
            false => None,
        };
        Ok(Self { encryption, iv })
    }
}

/// Client's SRP identity claim. The password never appears on the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SrpIdentify {
    pub username: String,
}

impl Write for SrpIdentify {
    fn write(&self, buf: &mut impl BufMut) {
        write_bytes(buf, self.username.as_bytes());
    }
}

impl EncodeSize for SrpIdentify {
    fn encode_size(&self) -> usize {
        bytes_size(self.username.as_bytes())
    }
}

impl Read for SrpIdentify {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = read_bytes(buf, MAX_USERNAME_SIZE, "SrpIdentify")?;
        let username = String::from_utf8(raw.to_vec())
            .map_err(|_| CodecError::Invalid("SrpIdentify", "username not utf-8"))?;
        Ok(Self { username })
    }
}

/// Server's half of the SRP exchange: the group, the user's salt, and `B`.
#[derive(Clone, Debug, PartialEq)]
pub struct SrpServerKeyExchange {
    /// Big-endian prime modulus N; must match a pinned group exactly.
    pub number: Bytes,
    /// Big-endian generator g.
    pub generator: Bytes,
    pub salt: Bytes,
    pub b: Bytes,
    /// IV for the server-to-client direction after re-keying.
    pub iv: [u8; IV_SIZE],
}

impl Write for SrpServerKeyExchange {
    fn write(&self, buf: &mut impl BufMut) {
        write_bytes(buf, &self.number);
        write_bytes(buf, &self.generator);
        write_bytes(buf, &self.salt);
        write_bytes(buf, &self.b);
        buf.put_slice(&self.iv);
    }
}

impl EncodeSize for SrpServerKeyExchange {
    fn encode_size(&self) -> usize {
        bytes_size(&self.number)
            + bytes_size(&self.generator)
            + bytes_size(&self.salt)
            + bytes_size(&self.b)
            + IV_SIZE
    }
}

impl Read for SrpServerKeyExchange {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let number = read_bytes(buf, MAX_MODULUS_SIZE, "SrpServerKeyExchange")?;
        let generator = read_bytes(buf, MAX_GENERATOR_SIZE, "SrpServerKeyExchange")?;
        let salt = read_bytes(buf, MAX_SALT_SIZE, "SrpServerKeyExchange")?;
        let b = read_bytes(buf, MAX_MODULUS_SIZE, "SrpServerKeyExchange")?;
        let iv = read_iv(buf)?;
        Ok(Self {
            number,
            generator,
            salt,
            b,
            iv,
        })
    }
}

/// Client's half of the SRP exchange: `A` and the client-to-server IV for
/// the re-keyed channel.
#[derive(Clone, Debug, PartialEq)]
pub struct SrpClientKeyExchange {
    pub a: Bytes,
    pub iv: [u8; IV_SIZE],
}

impl Write for SrpClientKeyExchange {
    fn write(&self, buf: &mut impl BufMut) {
        write_bytes(buf, &self.a);
        buf.put_slice(&self.iv);
    }
}

impl EncodeSize for SrpClientKeyExchange {
    fn encode_size(&self) -> usize {
        bytes_size(&self.a) + IV_SIZE
    }
}

impl Read for SrpClientKeyExchange {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let a = read_bytes(buf, MAX_MODULUS_SIZE, "SrpClientKeyExchange")?;
        let iv = read_iv(buf)?;
        Ok(Self { a, iv })
    }
}

/// Server's post-authentication challenge: which session types it offers
/// and what version it runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionChallenge {
    pub session_types: u32,
    pub version: Version,
}

impl Write for SessionChallenge {
    fn write(&self, buf: &mut impl BufMut) {
        self.session_types.write(buf);
        self.version.write(buf);
    }
}

impl EncodeSize for SessionChallenge {
    fn encode_size(&self) -> usize {
        self.session_types.encode_size() + self.version.encode_size()
    }
}

impl Read for SessionChallenge {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            session_types: u32::read(buf)?,
            version: Version::read(buf)?,
        })
    }
}

/// Client's final message: the single session type it is claiming.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionResponse {
    pub session_type: u32,
}

impl Write for SessionResponse {
    fn write(&self, buf: &mut impl BufMut) {
        self.session_type.write(buf);
    }
}

impl EncodeSize for SessionResponse {
    fn encode_size(&self) -> usize {
        self.session_type.encode_size()
    }
}

impl Read for SessionResponse {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            session_type: u32::read(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::{DecodeExt, Encode};

    #[test]
    fn test_client_hello_roundtrip() {
        for (public_key, iv) in [
            (None, None),
            (
                Some(x25519::PublicKey::from_bytes([9u8; 32])),
                Some([4u8; IV_SIZE]),
            ),
        ] {
            let hello = ClientHello {
                encryption: CIPHER_AES256_GCM | CIPHER_CHACHA20_POLY1305,
                identify: Identify::Srp,
                public_key,
                iv,
            };
            let encoded = hello.encode();
            assert_eq!(encoded.len(), hello.encode_size());
            assert_eq!(ClientHello::decode(encoded).unwrap(), hello);
        }
    }

    #[test]
    fn test_server_hello_roundtrip() {
        let hello = ServerHello {
            encryption: CIPHER_CHACHA20_POLY1305,
            iv: Some([7u8; IV_SIZE]),
        };
        assert_eq!(ServerHello::decode(hello.encode()).unwrap(), hello);
    }

    #[test]
    fn test_srp_messages_roundtrip() {
        let identify = SrpIdentify {
            username: "alice".into(),
        };
        assert_eq!(SrpIdentify::decode(identify.encode()).unwrap(), identify);

        let server = SrpServerKeyExchange {
            number: Bytes::from(vec![0xFF; 512]),
            generator: Bytes::from_static(&[5]),
            salt: Bytes::from(vec![1u8; 64]),
            b: Bytes::from(vec![2u8; 512]),
            iv: [3u8; IV_SIZE],
        };
        let encoded = server.encode();
        assert_eq!(encoded.len(), server.encode_size());
        assert_eq!(SrpServerKeyExchange::decode(encoded).unwrap(), server);

        let client = SrpClientKeyExchange {
            a: Bytes::from(vec![4u8; 512]),
            iv: [5u8; IV_SIZE],
        };
        assert_eq!(SrpClientKeyExchange::decode(client.encode()).unwrap(), client);
    }

    #[test]
    fn test_challenge_response_roundtrip() {
        let challenge = SessionChallenge {
            session_types: 0x07,
            version: Version::new(2, 14, 3),
        };
        assert_eq!(SessionChallenge::decode(challenge.encode()).unwrap(), challenge);

        let response = SessionResponse { session_type: 0x02 };
        assert_eq!(SessionResponse::decode(response.encode()).unwrap(), response);
    }

    #[test]
    fn test_identify_unknown_kind() {
        assert!(Identify::decode(&[2u8][..]).is_err());
    }

    #[test]
    fn test_username_cap() {
        let identify = SrpIdentify {
            username: "x".repeat(MAX_USERNAME_SIZE + 1),
        };
        assert!(SrpIdentify::decode(identify.encode()).is_err());
    }

    #[test]
    fn test_modulus_cap() {
        let exchange = SrpServerKeyExchange {
            number: Bytes::from(vec![0xFF; MAX_MODULUS_SIZE + 1]),
            generator: Bytes::from_static(&[5]),
            salt: Bytes::from(vec![1u8; 64]),
            b: Bytes::from(vec![2u8; 128]),
            iv: [0u8; IV_SIZE],
        };
        assert!(SrpServerKeyExchange::decode(exchange.encode()).is_err());
    }

    #[test]
    fn test_truncated_input() {
        let hello = ClientHello {
            encryption: CIPHER_CHACHA20_POLY1305,
            identify: Identify::Anonymous,
            public_key: Some(x25519::PublicKey::from_bytes([1u8; 32])),
            iv: Some([2u8; IV_SIZE]),
        };
        let encoded = hello.encode();
        assert!(ClientHello::decode(&encoded[..encoded.len() - 1]).is_err());
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let response = SessionResponse { session_type: 0x01 };
        let mut encoded = response.encode().to_vec();
        encoded.push(0);
        assert!(SessionResponse::decode(&encoded[..]).is_err());
    }
}
