//! SRP-6a key agreement.
//!
//! RFC 5054 formulas over the pinned groups in [groups], with BLAKE2s-256 as
//! the interior hash:
//!
//! - `x = H(salt || H(username || ":" || password))`
//! - `u = H(pad(A) || pad(B))`
//! - `k = H(N || pad(g))`
//! - client premaster `S = (B - k * g^x) ^ (a + u * x) mod N`
//! - server premaster `S = (A * v^u) ^ b mod N`
//!
//! The server stores the verifier `v = g^x mod N`, never the password. The
//! premaster is fed into the session key schedule by the authenticators; it
//! is not used as a key directly.

pub mod groups;
pub use groups::{lookup, Group, GROUP_4096, GROUP_6144, GROUP_8192};

use blake2::{Blake2s256, Digest};
use num_bigint::BigUint;
use num_traits::Zero;
use rand::{CryptoRng, Rng};
use zeroize::Zeroize;

/// Byte length of the private exponents `a` and `b` (1024 bits).
pub const PRIVATE_SIZE: usize = 128;

fn hash(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2s256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Left-pad a value to the byte length of N (the PAD operation of
/// RFC 5054). Also how public ephemerals are written to the wire, so their
/// length always equals the modulus length.
pub fn pad(value: &BigUint, n: &BigUint) -> Vec<u8> {
    let size = n.bits().div_ceil(8) as usize;
    let bytes = value.to_bytes_be();
    let mut padded = vec![0u8; size.saturating_sub(bytes.len())];
    padded.extend_from_slice(&bytes);
    padded
}

/// Generate a fresh private exponent from `PRIVATE_SIZE` random bytes.
pub fn generate_private<R: Rng + CryptoRng>(rng: &mut R) -> BigUint {
    let mut bytes = [0u8; PRIVATE_SIZE];
    rng.fill_bytes(&mut bytes);
    let private = BigUint::from_bytes_be(&bytes);
    bytes.zeroize();
    private
}

/// The password-derived secret `x`.
pub fn compute_x(salt: &[u8], username: &str, password: &str) -> BigUint {
    let mut inner = hash(&[username.as_bytes(), b":", password.as_bytes()]);
    let x = BigUint::from_bytes_be(&hash(&[salt, &inner]));
    inner.zeroize();
    x
}

/// The scrambling parameter `u`.
pub fn compute_u(client_public: &BigUint, server_public: &BigUint, n: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&hash(&[&pad(client_public, n), &pad(server_public, n)]))
}

/// The multiplier parameter `k`.
pub fn compute_k(n: &BigUint, g: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&hash(&[&n.to_bytes_be(), &pad(g, n)]))
}

/// The client's public ephemeral `A = g^a mod N`.
pub fn client_public(a: &BigUint, n: &BigUint, g: &BigUint) -> BigUint {
    g.modpow(a, n)
}

/// The password verifier `v = g^x mod N` (what the server stores).
pub fn compute_verifier(x: &BigUint, n: &BigUint, g: &BigUint) -> BigUint {
    g.modpow(x, n)
}

/// The server's public ephemeral `B = (k*v + g^b) mod N`.
pub fn server_public(b: &BigUint, verifier: &BigUint, n: &BigUint, g: &BigUint) -> BigUint {
    let k = compute_k(n, g);
    (k * verifier + g.modpow(b, n)) % n
}

/// A public ephemeral that is zero modulo N would collapse the premaster;
/// both sides must reject it before exponentiating.
pub fn verify_public(value: &BigUint, n: &BigUint) -> bool {
    !(value % n).is_zero()
}

/// The client-side premaster. `None` when the result degenerates to zero.
pub fn client_premaster(
    n: &BigUint,
    g: &BigUint,
    server_public: &BigUint,
    x: &BigUint,
    a: &BigUint,
    u: &BigUint,
) -> Option<BigUint> {
    let k = compute_k(n, g);
    let kgx = (k * g.modpow(x, n)) % n;
    let base = ((server_public % n) + n - kgx) % n;
    let premaster = base.modpow(&(a + u * x), n);
    if premaster.is_zero() {
        return None;
    }
    Some(premaster)
}

/// The server-side premaster. `None` when the result degenerates to zero.
pub fn server_premaster(
    n: &BigUint,
    client_public: &BigUint,
    verifier: &BigUint,
    u: &BigUint,
    b: &BigUint,
) -> Option<BigUint> {
    let base = (client_public * verifier.modpow(u, n)) % n;
    let premaster = base.modpow(b, n);
    if premaster.is_zero() {
        return None;
    }
    Some(premaster)
}
