//! Session key schedule.

use blake2::{Blake2s256, Digest};
use deskwire_stream::cipher::KEY_SIZE;
use zeroize::Zeroizing;

/// Derive the next session key: `BLAKE2s-256(prior || material)`, with an
/// absent prior contributing nothing. Used once per installed cipher pair:
/// first with the ECDH shared secret alone, then (for SRP) with the prior
/// key and the SRP premaster, which binds the password proof to the pinned
/// channel.
pub(crate) fn mix(prior: Option<&[u8]>, material: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut hasher = Blake2s256::new();
    if let Some(prior) = prior {
        hasher.update(prior);
    }
    hasher.update(material);
    Zeroizing::new(hasher.finalize().into())
}
