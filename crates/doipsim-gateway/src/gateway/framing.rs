//! TCP stream framing

use std::io;

use doipsim_proto::{DoipHeader, DoipMessage, ProtoError, HEADER_LEN};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read one DoIP frame from `reader`
///
/// Returns `Ok(None)` once the peer closed the stream. A frame that fails
/// validation is returned as `Some(Err(_))`; if the error keeps the socket
/// open, its payload has already been discarded so the next call starts at
/// a frame boundary.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    max_data_size: u32,
) -> io::Result<Option<Result<DoipMessage, ProtoError>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let header = match DoipHeader::parse(&header) {
        Ok(header) => header,
        Err(e) => return Ok(Some(Err(e))),
    };

    let checked = header
        .payload_kind()
        .and_then(|_| header.check_length(max_data_size));
    if let Err(e) = checked {
        let discarded = discard(reader, header.payload_length).await?;
        if !discarded {
            return Ok(None);
        }
        return Ok(Some(Err(e)));
    }

    let mut payload = vec![0u8; header.payload_length as usize];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    Ok(Some(DoipMessage::decode(&header, &payload)))
}

/// Skip `length` payload bytes; false if the stream ended first
async fn discard<R>(reader: &mut R, length: u32) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let length = u64::from(length);
    let copied = tokio::io::copy(&mut reader.take(length), &mut tokio::io::sink()).await?;
    Ok(copied == length)
}
