//! Length-delimited framing over raw byte streams.
//!
//! A frame is a big-endian `u32` payload length followed by the payload
//! itself. Assembly and prefix validation are pure functions ([encode],
//! [payload_size]); [send_frame] and [recv_frame] bind them to a transport.

use crate::Error;
use bytes::{BufMut, Bytes, BytesMut};
use commonware_runtime::{Sink, Stream};

/// Bytes occupied by the length prefix of every frame.
pub const PREFIX_SIZE: usize = std::mem::size_of::<u32>();

/// Largest payload a prefix can describe.
const MAX_PAYLOAD: usize = u32::MAX as usize;

/// Assemble one wire frame from a payload. Empty payloads are refused (a
/// zero prefix means "closed"), as are payloads above the channel bound.
pub fn encode(payload: &[u8], max_frame_size: usize) -> Result<BytesMut, Error> {
    match payload.len() {
        0 => Err(Error::SendZeroSize),
        n if n > max_frame_size || n > MAX_PAYLOAD => Err(Error::SendTooLarge(n)),
        n => {
            let mut wire = BytesMut::with_capacity(PREFIX_SIZE + n);
            wire.put_u32(n as u32);
            wire.put_slice(payload);
            Ok(wire)
        }
    }
}

/// Interpret a received length prefix, bounding the payload it announces.
pub fn payload_size(prefix: [u8; PREFIX_SIZE], max_frame_size: usize) -> Result<usize, Error> {
    match u32::from_be_bytes(prefix) as usize {
        0 => Err(Error::StreamClosed),
        n if n > max_frame_size => Err(Error::RecvTooLarge(n)),
        n => Ok(n),
    }
}

/// Write one frame to the sink. Nothing is written when the payload is
/// refused.
pub async fn send_frame<S: Sink>(
    sink: &mut S,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<(), Error> {
    let wire = encode(payload, max_frame_size)?;
    sink.send(wire).await.map_err(Error::SendFailed)
}

/// Read one frame from the stream: the prefix, then exactly the payload it
/// announces. An oversize prefix fails before any payload is read.
pub async fn recv_frame<S: Stream>(stream: &mut S, max_frame_size: usize) -> Result<Bytes, Error> {
    let read = stream
        .recv(vec![0; PREFIX_SIZE])
        .await
        .map_err(Error::RecvFailed)?;
    let mut prefix = [0u8; PREFIX_SIZE];
    prefix.copy_from_slice(read.as_ref());

    let size = payload_size(prefix, max_frame_size)?;
    let payload = stream.recv(vec![0; size]).await.map_err(Error::RecvFailed)?;
    Ok(payload.into())
}
