//! NDJSON codec shared by the agent pipes and the client stdio transport.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! misbehaving peer cannot make the bridge buffer an unterminated line
//! forever.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum accepted line length: 1 MiB.
///
/// Longer inbound lines make [`NdjsonCodec::decode`] return
/// [`AppError::Protocol`] with `"line too long"`; the reader treats that the
/// same way as a malformed line and keeps going. Lines that are not valid
/// UTF-8 are reported the same way.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited JSON framing.
///
/// Each `\n`-terminated UTF-8 string is one message. The encoder appends the
/// delimiter; the length limit is only enforced when decoding.
///
/// ```rust,ignore
/// use tokio_util::codec::FramedRead;
/// use agent_bridge::rpc::codec::NdjsonCodec;
///
/// let lines = FramedRead::new(child_stdout, NdjsonCodec::new());
/// ```
#[derive(Debug)]
pub struct NdjsonCodec(LinesCodec);

impl NdjsonCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for NdjsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NdjsonCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for NdjsonCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        // LinesCodec has already consumed the offending line.
        LinesCodecError::Io(io_err) if io_err.kind() == std::io::ErrorKind::InvalidData => {
            AppError::Protocol(format!("invalid utf-8 line: {io_err}"))
        }
        LinesCodecError::Io(io_err) => io_err.into(),
    }
}
