//! Reading an HTTP head off a raw byte stream.
//!
//! Both sides of a tunnel start as HTTP/1.1 and turn into raw streams right
//! after the head, so whatever arrives past the blank line belongs to the
//! tunnel and is returned to the caller instead of being dropped.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TunnelError;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Read until the end of an HTTP head.
///
/// Returns `(head, rest)` where `head` ends with the blank line and `rest`
/// holds any bytes the peer already sent beyond it.
pub async fn read_head<R>(reader: &mut R, max_bytes: usize) -> Result<(Bytes, Bytes), TunnelError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    let mut scanned = 0;

    loop {
        if let Some(end) = find_terminator(&buf, scanned) {
            let rest = buf.split_off(end);
            return Ok((buf.freeze(), rest.freeze()));
        }
        if buf.len() >= max_bytes {
            return Err(TunnelError::HeadTooLarge(max_bytes));
        }
        // The terminator may straddle two reads.
        scanned = buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);

        if reader.read_buf(&mut buf).await? == 0 {
            return Err(TunnelError::IncompleteHead);
        }
    }
}

fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| from + pos + HEAD_TERMINATOR.len())
}
