//! Relay traffic between two admitted peers.
//!
//! A relay never takes part in authentication: by the time a [Session] is
//! created, an admission process has already matched and verified both
//! transports. The relay's only job is to move frames from each side to the
//! other, account for the bytes it carries, and tear the pairing down when
//! either side fails. Relayed frames are opaque: the peers' end-to-end
//! encryption passes through untouched.

mod session;
pub use session::{Config, Finished, Session};
