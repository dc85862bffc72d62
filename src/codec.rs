//! Length-prefixed framing for the stream transport.
//!
//! Each frame is a 4-byte big-endian signed length followed by exactly that
//! many UTF-8 bytes. A negative length is a corrupt frame. A stream that ends
//! before any header byte arrives is a clean close; a stream that ends inside
//! a header or a payload is a truncation error. Partial payloads are never
//! returned.
//!
//! The rules are offered twice: as the free functions [`read_frame`] and
//! [`write_frame`] over any `AsyncRead`/`AsyncWrite`, and as the
//! [`LengthPrefixedCodec`] `Decoder`/`Encoder` pair used by framed sessions.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

pub mod error;

pub use error::{CodecError, EofError, FramingError};

/// Length header size in bytes.
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Smallest maximum frame length a codec may be configured with.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Largest length the header can represent.
#[expect(clippy::cast_sign_loss, reason = "i32::MAX is positive")]
pub const MAX_FRAME_LENGTH: usize = i32::MAX as usize;

/// Default maximum frame length for framed sessions (16 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Initial buffer reservation when reading a payload of unknown trust.
const READ_CHUNK: usize = 64 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Decode a length header, rejecting negative and oversized lengths.
fn parse_header(header: [u8; LENGTH_HEADER_SIZE], max: usize) -> Result<usize, FramingError> {
    let length = i32::from_be_bytes(header);
    let size = usize::try_from(length).map_err(|_| FramingError::NegativeLength { length })?;
    if size > max {
        return Err(FramingError::OversizedFrame { size, max });
    }
    Ok(size)
}

/// Encode a length header for a payload of `size` bytes.
fn encode_header(size: usize, max: usize) -> Result<[u8; LENGTH_HEADER_SIZE], FramingError> {
    let oversized = FramingError::OversizedFrame { size, max };
    if size > max {
        return Err(oversized);
    }
    let length = i32::try_from(size).map_err(|_| oversized)?;
    Ok(length.to_be_bytes())
}

fn into_text(payload: Vec<u8>) -> Result<String, FramingError> {
    String::from_utf8(payload).map_err(|_| FramingError::InvalidUtf8)
}

/// Write one frame carrying `payload` and flush the sink.
///
/// # Errors
///
/// Returns [`FramingError::OversizedFrame`] if the payload length cannot be
/// represented as a non-negative `i32`, or an I/O error from the sink.
pub async fn write_frame<W>(sink: &mut W, payload: &str) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = encode_header(payload.len(), MAX_FRAME_LENGTH)?;
    sink.write_all(&header).await?;
    sink.write_all(payload.as_bytes()).await?;
    sink.flush().await?;
    Ok(())
}

/// Read one frame from `source`.
///
/// Returns `Ok(None)` when the stream ends before any header byte is read.
///
/// # Errors
///
/// Returns [`FramingError::NegativeLength`] for a negative header,
/// [`EofError`] when the stream ends part way through a frame,
/// [`FramingError::InvalidUtf8`] for a non-UTF-8 payload, or an I/O error.
pub async fn read_frame<R>(source: &mut R) -> Result<Option<String>, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0_u8; LENGTH_HEADER_SIZE];
    let received = read_up_to(source, &mut header).await?;
    if received == 0 {
        return Ok(None);
    }
    if received < LENGTH_HEADER_SIZE {
        return Err(EofError::MidHeader {
            bytes_received: received,
            header_size: LENGTH_HEADER_SIZE,
        }
        .into());
    }

    let expected = parse_header(header, MAX_FRAME_LENGTH)?;
    // The header is untrusted, so grow the buffer as bytes arrive.
    let mut payload = Vec::with_capacity(expected.min(READ_CHUNK));
    (&mut *source)
        .take(expected as u64)
        .read_to_end(&mut payload)
        .await?;
    if payload.len() < expected {
        return Err(EofError::MidFrame {
            bytes_received: payload.len(),
            expected,
        }
        .into());
    }
    Ok(Some(into_text(payload)?))
}

/// Fill `buf` until it is full or the stream ends, returning the byte count.
async fn read_up_to<R>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let Some(rest) = buf.get_mut(filled..) else { break };
        let n = source.read(rest).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// `tokio_util` codec for length-prefixed UTF-8 frames.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::{Decoder, Encoder};
/// use toolwire::codec::LengthPrefixedCodec;
///
/// let mut codec = LengthPrefixedCodec::default();
/// let mut buf = BytesMut::new();
/// codec.encode("hello".to_string(), &mut buf).unwrap();
/// assert_eq!(&buf[..4], &[0, 0, 0, 5]);
/// assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("hello"));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct LengthPrefixedCodec {
    max_frame_length: usize,
}

impl LengthPrefixedCodec {
    /// Create a codec accepting frames up to `max_frame_length` bytes.
    ///
    /// The limit is clamped to `[MIN_FRAME_LENGTH, MAX_FRAME_LENGTH]`.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }

    /// Maximum accepted frame length.
    #[must_use]
    pub const fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

fn peek_header(src: &BytesMut) -> Option<[u8; LENGTH_HEADER_SIZE]> {
    src.get(..LENGTH_HEADER_SIZE)
        .and_then(|slice| <[u8; LENGTH_HEADER_SIZE]>::try_from(slice).ok())
}

impl Decoder for LengthPrefixedCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = peek_header(src) else {
            return Ok(None);
        };
        let length = parse_header(header, self.max_frame_length)?;
        let total = LENGTH_HEADER_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(LENGTH_HEADER_SIZE);
        let payload = src.split_to(length);
        Ok(Some(into_text(payload.to_vec())?))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(build_eof_error(src).into()),
        }
    }
}

/// Classify leftover bytes at EOF as a truncated header or payload.
fn build_eof_error(src: &BytesMut) -> EofError {
    match peek_header(src) {
        Some(header) => EofError::MidFrame {
            bytes_received: src.len().saturating_sub(LENGTH_HEADER_SIZE),
            expected: usize::try_from(i32::from_be_bytes(header)).unwrap_or(0),
        },
        None => EofError::MidHeader {
            bytes_received: src.len(),
            header_size: LENGTH_HEADER_SIZE,
        },
    }
}

impl Encoder<String> for LengthPrefixedCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&str>>::encode(self, item.as_str(), dst)
    }
}

impl Encoder<&str> for LengthPrefixedCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header = encode_header(item.len(), self.max_frame_length)?;
        dst.reserve(LENGTH_HEADER_SIZE + item.len());
        dst.put_slice(&header);
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}
