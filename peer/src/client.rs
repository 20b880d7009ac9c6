//! Client side of the authentication handshake.

use crate::{
    cpu, key,
    messages::{
        ClientHello, Identify, ServerHello, SessionChallenge, SessionResponse,
        SrpClientKeyExchange, SrpIdentify, SrpServerKeyExchange, Version, CIPHER_AES256_GCM,
        CIPHER_CHACHA20_POLY1305,
    },
    srp, x25519, Error,
};
use commonware_codec::{DecodeExt, Encode};
use commonware_runtime::{Sink, Stream};
use deskwire_stream::{
    cipher::{Algorithm, Cipher, Iv, IV_SIZE},
    Channel,
};
use num_bigint::BigUint;
use rand::{CryptoRng, Rng};
use tracing::debug;
use zeroize::Zeroizing;

/// Minimum length of a server-supplied SRP salt.
const MIN_SALT_SIZE: usize = 64;

/// Minimum length of the server's public ephemeral `B` on the wire.
const MIN_SERVER_PUBLIC_SIZE: usize = 128;

/// Who the client claims to be.
#[derive(Clone)]
pub enum Identity {
    /// No user identity: the pinned host key alone authenticates the peer.
    /// Refused unless [Config::peer_public_key] is set.
    Anonymous,
    /// SRP-6a. The password stays local and is wiped after the handshake.
    Srp {
        username: String,
        password: Zeroizing<String>,
    },
}

/// Configuration for one authentication attempt.
#[derive(Clone)]
pub struct Config {
    /// The host's long-term X25519 public key, when known out-of-band.
    pub peer_public_key: Option<x25519::PublicKey>,

    pub identity: Identity,

    /// The single session-type bit to request.
    pub session_type: u32,

    /// Maximum plaintext size of any message on the channel.
    pub max_message_size: usize,
}

/// An authenticated, encrypted session produced by a successful handshake.
pub struct Session<Si: Sink, St: Stream> {
    channel: Channel<Si, St>,
    peer_version: Version,
}

impl<Si: Sink, St: Stream> std::fmt::Debug for Session<Si, St> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer_version", &self.peer_version)
            .finish_non_exhaustive()
    }
}

impl<Si: Sink, St: Stream> Session<Si, St> {
    /// The version the host reported in its challenge.
    pub fn peer_version(&self) -> Version {
        self.peer_version
    }

    /// Reclaim the channel for application traffic. The installed ciphers
    /// survive the handover.
    pub fn into_channel(self) -> Channel<Si, St> {
        self.channel
    }
}

/// Authenticate to a host over a connected transport.
///
/// Consumes the transport; on success the (now encrypted) channel comes
/// back inside [Session]. Every failure is terminal: nothing of a partial
/// handshake is exposed, and the transport is dropped.
pub async fn authenticate<R: Rng + CryptoRng, Si: Sink, St: Stream>(
    context: R,
    config: Config,
    sink: Si,
    stream: St,
) -> Result<Session<Si, St>, Error> {
    // Advertise ChaCha20-Poly1305 always, AES-256-GCM only when the CPU
    // accelerates it.
    let mut ciphers = CIPHER_CHACHA20_POLY1305;
    if cpu::has_aes_ni() {
        ciphers |= CIPHER_AES256_GCM;
    }
    handshake(context, config, ciphers, sink, stream).await
}

/// The handshake proper, with the cipher offer already fixed.
async fn handshake<R: Rng + CryptoRng, Si: Sink, St: Stream>(
    mut context: R,
    config: Config,
    advertised: u32,
    sink: Si,
    stream: St,
) -> Result<Session<Si, St>, Error> {
    if config.session_type.count_ones() != 1 {
        return Err(Error::MisconfiguredSessionType(config.session_type));
    }
    // We do not allow anonymous connections without a pinned key.
    if matches!(config.identity, Identity::Anonymous) && config.peer_public_key.is_none() {
        return Err(Error::MissingPeerKey);
    }

    let mut channel = Channel::new(sink, stream, config.max_message_size);

    // ClientHello: the cipher offer, the identity kind, and the ECDH factor
    // when a key is pinned.
    let identify = match &config.identity {
        Identity::Anonymous => Identify::Anonymous,
        Identity::Srp { .. } => Identify::Srp,
    };
    let mut hello = ClientHello {
        encryption: advertised,
        identify,
        public_key: None,
        iv: None,
    };
    let mut pinned = None;
    if let Some(peer_public_key) = &config.peer_public_key {
        let mut encrypt_iv = [0u8; IV_SIZE];
        context.fill_bytes(&mut encrypt_iv);
        let secret = x25519::ephemeral(&mut context);
        hello.public_key = Some(x25519::PublicKey::from_secret(&secret));
        hello.iv = Some(encrypt_iv);

        let shared = secret.diffie_hellman(peer_public_key.as_ref());
        if !shared.was_contributory() {
            return Err(Error::SharedSecretNotContributory);
        }
        pinned = Some((key::mix(None, shared.as_bytes()), encrypt_iv));
    }
    debug!("sending ClientHello");
    channel.send(&hello.encode()).await?;

    // ServerHello: exactly one cipher, chosen among those we advertised,
    // and an IV iff we sent one.
    let msg = channel.recv().await?;
    let server_hello =
        ServerHello::decode(msg).map_err(|err| Error::UnableToDecode("ServerHello", err))?;
    debug!(encryption = server_hello.encryption, "received ServerHello");
    let algorithm = match server_hello.encryption {
        CIPHER_AES256_GCM => Algorithm::Aes256Gcm,
        CIPHER_CHACHA20_POLY1305 => Algorithm::ChaCha20Poly1305,
        other => return Err(Error::InvalidCipher(other)),
    };
    if server_hello.encryption & advertised == 0 {
        return Err(Error::InvalidCipher(server_hello.encryption));
    }
    match (&pinned, server_hello.iv) {
        (Some((session_key, encrypt_iv)), Some(decrypt_iv)) => {
            channel.install(
                Cipher::new(algorithm, session_key, Iv::new(*encrypt_iv)),
                Cipher::new(algorithm, session_key, Iv::new(decrypt_iv)),
            );
        }
        (None, None) => {}
        _ => return Err(Error::IvMismatch),
    }

    // SRP identities run the key exchange and re-key; anonymous identities
    // proceed straight to the challenge.
    if let Identity::Srp { username, password } = &config.identity {
        debug!("sending SrpIdentify");
        let identify = SrpIdentify {
            username: username.clone(),
        };
        channel.send(&identify.encode()).await?;

        let msg = channel.recv().await?;
        let exchange = SrpServerKeyExchange::decode(msg)
            .map_err(|err| Error::UnableToDecode("SrpServerKeyExchange", err))?;
        debug!(modulus = exchange.number.len(), "received SrpServerKeyExchange");
        if exchange.salt.len() < MIN_SALT_SIZE {
            return Err(Error::SaltTooShort(exchange.salt.len()));
        }
        if exchange.b.len() < MIN_SERVER_PUBLIC_SIZE {
            return Err(Error::ServerPublicTooShort(exchange.b.len()));
        }
        let group = srp::lookup(&exchange.number, &exchange.generator)
            .ok_or(Error::UnknownSrpGroup(exchange.number.len()))?;
        let n = group.modulus();
        let g = group.generator();
        let server_public = BigUint::from_bytes_be(&exchange.b);
        let decrypt_iv = exchange.iv;

        let a = srp::generate_private(&mut context);
        let client_public = srp::client_public(&a, &n, &g);
        let mut encrypt_iv = [0u8; IV_SIZE];
        context.fill_bytes(&mut encrypt_iv);

        if !srp::verify_public(&server_public, &n) {
            return Err(Error::DegeneratePublic);
        }
        let u = srp::compute_u(&client_public, &server_public, &n);
        let x = srp::compute_x(&exchange.salt, username, password);
        let premaster = srp::client_premaster(&n, &g, &server_public, &x, &a, &u)
            .ok_or(Error::KeyDerivationFailed)?;
        let material = Zeroizing::new(premaster.to_bytes_be());
        let session_key = key::mix(
            pinned.as_ref().map(|(key, _)| key.as_slice()),
            &material,
        );

        debug!("sending SrpClientKeyExchange");
        let exchange = SrpClientKeyExchange {
            a: client_public.to_bytes_be().into(),
            iv: encrypt_iv,
        };
        channel.send(&exchange.encode()).await?;

        // The write completed, so the peer reads everything that follows
        // under the re-keyed ciphers.
        channel.install(
            Cipher::new(algorithm, &session_key, Iv::new(encrypt_iv)),
            Cipher::new(algorithm, &session_key, Iv::new(decrypt_iv)),
        );
    }

    // SessionChallenge: the host's offer must cover what we want. A frame
    // that fails to open here means our keys disagree (wrong credentials).
    let msg = channel.recv().await?;
    let challenge = SessionChallenge::decode(msg)
        .map_err(|err| Error::UnableToDecode("SessionChallenge", err))?;
    debug!(
        session_types = challenge.session_types,
        version = %challenge.version,
        "received SessionChallenge"
    );
    if challenge.session_types & config.session_type == 0 {
        return Err(Error::SessionDenied);
    }
    let peer_version = challenge.version;

    let response = SessionResponse {
        session_type: config.session_type,
    };
    debug!("sending SessionResponse");
    channel.send(&response.encode()).await?;

    debug!(version = %peer_version, "authentication complete");
    Ok(Session {
        channel,
        peer_version,
    })
}
