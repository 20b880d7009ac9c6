use crate::{
    cipher::{Cipher, TAG_SIZE},
    frame::{recv_frame, send_frame},
    Error,
};
use bytes::Bytes;
use commonware_runtime::{Sink, Stream};

/// A message channel over a connected byte stream pair.
///
/// Starts in plaintext; [Channel::install] attaches (or replaces) the AEAD
/// sealer and opener on a frame boundary. The channel is exclusively owned
/// by whoever drives it, so a handshake can hold it for its duration and
/// hand it back with the ciphers intact.
pub struct Channel<Si: Sink, St: Stream> {
    sink: Si,
    stream: St,
    max_frame_size: usize,
    sealer: Option<Cipher>,
    opener: Option<Cipher>,
}

impl<Si: Sink, St: Stream> Channel<Si, St> {
    /// Wrap a connected sink/stream pair. `max_frame_size` bounds the
    /// plaintext size of any single message in either direction.
    pub fn new(sink: Si, stream: St, max_frame_size: usize) -> Self {
        Self {
            sink,
            stream,
            max_frame_size,
            sealer: None,
            opener: None,
        }
    }

    /// Install (or replace) the sealer and opener atomically.
    ///
    /// The next frame sent is sealed with `sealer` and the next frame
    /// received is opened with `opener`. Callers must only invoke this on a
    /// clean frame boundary agreed with the peer.
    pub fn install(&mut self, sealer: Cipher, opener: Cipher) {
        self.sealer = Some(sealer);
        self.opener = Some(opener);
    }

    /// Whether an AEAD pair is currently installed.
    pub fn encrypted(&self) -> bool {
        self.sealer.is_some()
    }

    /// Send one message, sealing it if a cipher is installed.
    pub async fn send(&mut self, msg: &[u8]) -> Result<(), Error> {
        match &mut self.sealer {
            Some(cipher) => {
                let sealed = cipher.seal(msg)?;
                send_frame(&mut self.sink, &sealed, self.max_frame_size + TAG_SIZE).await
            }
            None => send_frame(&mut self.sink, msg, self.max_frame_size).await,
        }
    }

    /// Receive one message, opening it if a cipher is installed.
    pub async fn recv(&mut self) -> Result<Bytes, Error> {
        match &mut self.opener {
            Some(cipher) => {
                let sealed = recv_frame(&mut self.stream, self.max_frame_size + TAG_SIZE).await?;
                Ok(cipher.open(&sealed)?.into())
            }
            None => recv_frame(&mut self.stream, self.max_frame_size).await,
        }
    }

    /// Split into independently owned halves for full-duplex traffic.
    pub fn split(self) -> (Sender<Si>, Receiver<St>) {
        (
            Sender {
                sink: self.sink,
                sealer: self.sealer,
                max_frame_size: self.max_frame_size,
            },
            Receiver {
                stream: self.stream,
                opener: self.opener,
                max_frame_size: self.max_frame_size,
            },
        )
    }
}

/// The sending half of a [Channel].
pub struct Sender<Si: Sink> {
    sink: Si,
    sealer: Option<Cipher>,
    max_frame_size: usize,
}

impl<Si: Sink> Sender<Si> {
    pub async fn send(&mut self, msg: &[u8]) -> Result<(), Error> {
        match &mut self.sealer {
            Some(cipher) => {
                let sealed = cipher.seal(msg)?;
                send_frame(&mut self.sink, &sealed, self.max_frame_size + TAG_SIZE).await
            }
            None => send_frame(&mut self.sink, msg, self.max_frame_size).await,
        }
    }
}

/// The receiving half of a [Channel].
pub struct Receiver<St: Stream> {
    stream: St,
    opener: Option<Cipher>,
    max_frame_size: usize,
}

impl<St: Stream> Receiver<St> {
    pub async fn recv(&mut self) -> Result<Bytes, Error> {
        match &mut self.opener {
            Some(cipher) => {
                let sealed = recv_frame(&mut self.stream, self.max_frame_size + TAG_SIZE).await?;
                Ok(cipher.open(&sealed)?.into())
            }
            None => recv_frame(&mut self.stream, self.max_frame_size).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{Algorithm, Iv, IV_SIZE, KEY_SIZE};
    use commonware_runtime::{deterministic, mocks, Runner};

    const MAX_FRAME_SIZE: usize = 1024;

    fn pair() -> (Channel<mocks::Sink, mocks::Stream>, Channel<mocks::Sink, mocks::Stream>) {
        let (left_sink, right_stream) = mocks::Channel::init();
        let (right_sink, left_stream) = mocks::Channel::init();
        (
            Channel::new(left_sink, left_stream, MAX_FRAME_SIZE),
            Channel::new(right_sink, right_stream, MAX_FRAME_SIZE),
        )
    }

    #[test]
    fn test_plaintext_roundtrip() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let (mut left, mut right) = pair();

            left.send(b"hello").await.unwrap();
            assert_eq!(right.recv().await.unwrap(), Bytes::from_static(b"hello"));

            right.send(b"world").await.unwrap();
            assert_eq!(left.recv().await.unwrap(), Bytes::from_static(b"world"));
        });
    }

    #[test]
    fn test_encrypted_roundtrip() {
        for algorithm in [Algorithm::Aes256Gcm, Algorithm::ChaCha20Poly1305] {
            let executor = deterministic::Runner::default();
            executor.start(move |_| async move {
                let (mut left, mut right) = pair();

                let key = [1u8; KEY_SIZE];
                let left_iv = Iv::new([2u8; IV_SIZE]);
                let right_iv = Iv::new([3u8; IV_SIZE]);
                left.install(
                    Cipher::new(algorithm, &key, left_iv),
                    Cipher::new(algorithm, &key, right_iv),
                );
                right.install(
                    Cipher::new(algorithm, &key, right_iv),
                    Cipher::new(algorithm, &key, left_iv),
                );

                for _ in 0..3 {
                    left.send(b"ping").await.unwrap();
                    assert_eq!(right.recv().await.unwrap(), Bytes::from_static(b"ping"));
                    right.send(b"pong").await.unwrap();
                    assert_eq!(left.recv().await.unwrap(), Bytes::from_static(b"pong"));
                }
            });
        }
    }

    #[test]
    fn test_rekey_on_frame_boundary() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let (mut left, mut right) = pair();

            let first_key = [1u8; KEY_SIZE];
            let iv = Iv::new([0u8; IV_SIZE]);
            left.install(
                Cipher::new(Algorithm::ChaCha20Poly1305, &first_key, iv),
                Cipher::new(Algorithm::ChaCha20Poly1305, &first_key, iv),
            );
            right.install(
                Cipher::new(Algorithm::ChaCha20Poly1305, &first_key, iv),
                Cipher::new(Algorithm::ChaCha20Poly1305, &first_key, iv),
            );

            left.send(b"before").await.unwrap();
            assert_eq!(right.recv().await.unwrap(), Bytes::from_static(b"before"));

            // Both sides replace their ciphers on the same boundary.
            let second_key = [2u8; KEY_SIZE];
            left.install(
                Cipher::new(Algorithm::Aes256Gcm, &second_key, iv),
                Cipher::new(Algorithm::Aes256Gcm, &second_key, iv),
            );
            right.install(
                Cipher::new(Algorithm::Aes256Gcm, &second_key, iv),
                Cipher::new(Algorithm::Aes256Gcm, &second_key, iv),
            );

            left.send(b"after").await.unwrap();
            assert_eq!(right.recv().await.unwrap(), Bytes::from_static(b"after"));
        });
    }

    #[test]
    fn test_key_mismatch() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let (mut left, mut right) = pair();

            let iv = Iv::new([0u8; IV_SIZE]);
            left.install(
                Cipher::new(Algorithm::ChaCha20Poly1305, &[1u8; KEY_SIZE], iv),
                Cipher::new(Algorithm::ChaCha20Poly1305, &[1u8; KEY_SIZE], iv),
            );
            right.install(
                Cipher::new(Algorithm::ChaCha20Poly1305, &[2u8; KEY_SIZE], iv),
                Cipher::new(Algorithm::ChaCha20Poly1305, &[2u8; KEY_SIZE], iv),
            );

            left.send(b"sealed").await.unwrap();
            assert!(matches!(right.recv().await, Err(Error::DecryptionFailed)));
        });
    }

    #[test]
    fn test_split_carries_ciphers() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let (mut left, mut right) = pair();

            let key = [5u8; KEY_SIZE];
            let iv = Iv::new([0u8; IV_SIZE]);
            left.install(
                Cipher::new(Algorithm::ChaCha20Poly1305, &key, iv),
                Cipher::new(Algorithm::ChaCha20Poly1305, &key, iv),
            );
            right.install(
                Cipher::new(Algorithm::ChaCha20Poly1305, &key, iv),
                Cipher::new(Algorithm::ChaCha20Poly1305, &key, iv),
            );

            left.send(b"pre-split").await.unwrap();
            assert_eq!(right.recv().await.unwrap(), Bytes::from_static(b"pre-split"));

            let (mut left_sender, mut left_receiver) = left.split();
            let (mut right_sender, mut right_receiver) = right.split();

            left_sender.send(b"to-right").await.unwrap();
            assert_eq!(
                right_receiver.recv().await.unwrap(),
                Bytes::from_static(b"to-right")
            );
            right_sender.send(b"to-left").await.unwrap();
            assert_eq!(
                left_receiver.recv().await.unwrap(),
                Bytes::from_static(b"to-left")
            );
        });
    }
}
