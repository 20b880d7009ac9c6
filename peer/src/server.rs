//! Host side of the authentication handshake.

use crate::{
    cpu, key,
    messages::{
        ClientHello, Identify, ServerHello, SessionChallenge, SessionResponse,
        SrpClientKeyExchange, SrpIdentify, SrpServerKeyExchange, Version, CIPHER_AES256_GCM,
        CIPHER_CHACHA20_POLY1305,
    },
    srp, Error,
};
use commonware_codec::{DecodeExt, Encode};
use commonware_runtime::{Sink, Stream};
use deskwire_stream::{
    cipher::{Algorithm, Cipher, Iv, IV_SIZE},
    Channel,
};
use num_bigint::BigUint;
use rand::{CryptoRng, Rng};
use std::collections::HashMap;
use tracing::debug;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

/// Length of the salt generated for new users.
const SALT_SIZE: usize = 64;

/// One provisioned user: a salt and an SRP verifier, never a password.
#[derive(Clone)]
pub struct User {
    pub username: String,
    pub group: &'static srp::Group,
    pub salt: Vec<u8>,
    pub verifier: BigUint,
}

impl User {
    /// Provision a user from a password. The password is hashed into the
    /// verifier and not retained.
    pub fn create<R: Rng + CryptoRng>(
        rng: &mut R,
        username: &str,
        password: &str,
        group: &'static srp::Group,
    ) -> Self {
        let mut salt = vec![0u8; SALT_SIZE];
        rng.fill_bytes(&mut salt);
        let x = srp::compute_x(&salt, username, password);
        let verifier = srp::compute_verifier(&x, &group.modulus(), &group.generator());
        Self {
            username: username.to_owned(),
            group,
            salt,
            verifier,
        }
    }
}

/// The set of users a host will authenticate.
#[derive(Clone, Default)]
pub struct Directory {
    users: HashMap<String, User>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, user: User) {
        self.users.insert(user.username.clone(), user);
    }

    fn find(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }
}

/// Host configuration.
pub struct Config {
    /// The host's long-term X25519 secret. Required to serve clients that
    /// pinned the corresponding public key.
    pub secret: Option<StaticSecret>,

    pub directory: Directory,

    /// Bitmask of session types this host offers.
    pub session_types: u32,

    /// Version reported in the challenge.
    pub version: Version,

    /// Group used when fabricating an exchange for an unknown username.
    pub group: &'static srp::Group,

    /// Maximum plaintext size of any message on the channel.
    pub max_message_size: usize,
}

/// An authenticated, encrypted session with a client.
pub struct Session<Si: Sink, St: Stream> {
    channel: Channel<Si, St>,
    username: Option<String>,
    session_type: u32,
}

impl<Si: Sink, St: Stream> Session<Si, St> {
    /// The authenticated username, absent for anonymous clients.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The single session-type bit the client claimed.
    pub fn session_type(&self) -> u32 {
        self.session_type
    }

    /// Reclaim the channel for application traffic.
    pub fn into_channel(self) -> Channel<Si, St> {
        self.channel
    }
}

/// Authenticate one client over a connected transport.
pub async fn authenticate<R: Rng + CryptoRng, Si: Sink, St: Stream>(
    mut context: R,
    config: Config,
    sink: Si,
    stream: St,
) -> Result<Session<Si, St>, Error> {
    let mut channel = Channel::new(sink, stream, config.max_message_size);

    // ClientHello: pick one cipher out of the client's offer, preferring
    // AES-256-GCM when this host accelerates it.
    let msg = channel.recv().await?;
    let hello = ClientHello::decode(msg).map_err(|err| Error::UnableToDecode("ClientHello", err))?;
    debug!(encryption = hello.encryption, "received ClientHello");
    // An anonymous client with no ECDH factor would get a session with no
    // authentication at all; refuse it, as the client itself does.
    if hello.identify == Identify::Anonymous && hello.public_key.is_none() {
        return Err(Error::MissingPeerKey);
    }
    let algorithm = if hello.encryption & CIPHER_AES256_GCM != 0 && cpu::has_aes_ni() {
        Algorithm::Aes256Gcm
    } else if hello.encryption & CIPHER_CHACHA20_POLY1305 != 0 {
        Algorithm::ChaCha20Poly1305
    } else {
        return Err(Error::InvalidCipher(hello.encryption));
    };
    let chosen = match algorithm {
        Algorithm::Aes256Gcm => CIPHER_AES256_GCM,
        Algorithm::ChaCha20Poly1305 => CIPHER_CHACHA20_POLY1305,
    };

    // The ECDH factor: the client sent its ephemeral key and an IV iff it
    // pinned our public key.
    let mut server_hello = ServerHello {
        encryption: chosen,
        iv: None,
    };
    let mut pinned = None;
    match (hello.public_key, hello.iv) {
        (Some(client_public), Some(decrypt_iv)) => {
            let secret = config.secret.as_ref().ok_or(Error::MissingHostKey)?;
            let shared = secret.diffie_hellman(client_public.as_ref());
            if !shared.was_contributory() {
                return Err(Error::SharedSecretNotContributory);
            }
            let mut encrypt_iv = [0u8; IV_SIZE];
            context.fill_bytes(&mut encrypt_iv);
            server_hello.iv = Some(encrypt_iv);
            pinned = Some((key::mix(None, shared.as_bytes()), encrypt_iv, decrypt_iv));
        }
        (None, None) => {}
        _ => return Err(Error::IvMismatch),
    }
    debug!(encryption = chosen, "sending ServerHello");
    channel.send(&server_hello.encode()).await?;

    // The client installs on receipt of ServerHello, so install once the
    // write is done.
    if let Some((session_key, encrypt_iv, decrypt_iv)) = &pinned {
        channel.install(
            Cipher::new(algorithm, session_key, Iv::new(*encrypt_iv)),
            Cipher::new(algorithm, session_key, Iv::new(*decrypt_iv)),
        );
    }

    let mut username = None;
    if hello.identify == Identify::Srp {
        let msg = channel.recv().await?;
        let identify =
            SrpIdentify::decode(msg).map_err(|err| Error::UnableToDecode("SrpIdentify", err))?;
        debug!(username = %identify.username, "received SrpIdentify");

        // Unknown usernames get a fabricated salt and verifier so the
        // exchange runs to completion and fails exactly like a wrong
        // password: the reply never reveals whether the user exists.
        let (group, salt, verifier) = match config.directory.find(&identify.username) {
            Some(user) => (user.group, user.salt.clone(), user.verifier.clone()),
            None => {
                debug!(username = %identify.username, "unknown user");
                let mut salt = vec![0u8; SALT_SIZE];
                context.fill_bytes(&mut salt);
                let n = config.group.modulus();
                let g = config.group.generator();
                let fake = srp::compute_verifier(&srp::generate_private(&mut context), &n, &g);
                (config.group, salt, fake)
            }
        };
        let n = group.modulus();
        let g = group.generator();

        let b = srp::generate_private(&mut context);
        let server_public = srp::server_public(&b, &verifier, &n, &g);
        let mut encrypt_iv = [0u8; IV_SIZE];
        context.fill_bytes(&mut encrypt_iv);

        debug!("sending SrpServerKeyExchange");
        let exchange = SrpServerKeyExchange {
            number: group.modulus_bytes().into(),
            generator: group.generator_bytes().into(),
            salt: salt.into(),
            b: srp::pad(&server_public, &n).into(),
            iv: encrypt_iv,
        };
        channel.send(&exchange.encode()).await?;

        let msg = channel.recv().await?;
        let exchange = SrpClientKeyExchange::decode(msg)
            .map_err(|err| Error::UnableToDecode("SrpClientKeyExchange", err))?;
        debug!("received SrpClientKeyExchange");
        let client_public = BigUint::from_bytes_be(&exchange.a);
        if !srp::verify_public(&client_public, &n) {
            return Err(Error::DegeneratePublic);
        }
        let u = srp::compute_u(&client_public, &server_public, &n);
        let premaster = srp::server_premaster(&n, &client_public, &verifier, &u, &b)
            .ok_or(Error::KeyDerivationFailed)?;
        let material = Zeroizing::new(premaster.to_bytes_be());
        let session_key = key::mix(
            pinned.as_ref().map(|(key, _, _)| key.as_slice()),
            &material,
        );

        // The client re-keys after its key exchange write; mirror that
        // boundary here, after the read.
        channel.install(
            Cipher::new(algorithm, &session_key, Iv::new(encrypt_iv)),
            Cipher::new(algorithm, &session_key, Iv::new(exchange.iv)),
        );
        username = Some(identify.username);
    }

    debug!(session_types = config.session_types, "sending SessionChallenge");
    let challenge = SessionChallenge {
        session_types: config.session_types,
        version: config.version,
    };
    channel.send(&challenge.encode()).await?;

    // A frame that fails to open here means the client's keys disagree with
    // ours: wrong password.
    let msg = channel.recv().await?;
    let response = SessionResponse::decode(msg)
        .map_err(|err| Error::UnableToDecode("SessionResponse", err))?;
    if response.session_type.count_ones() != 1 {
        return Err(Error::InvalidSessionType(response.session_type));
    }
    if response.session_type & config.session_types == 0 {
        return Err(Error::SessionDenied);
    }

    debug!(
        username = username.as_deref().unwrap_or("<anonymous>"),
        session_type = response.session_type,
        "client authenticated"
    );
    Ok(Session {
        channel,
        username,
        session_type: response.session_type,
    })
}
