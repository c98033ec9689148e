//! Frame encoding and decoding for both directions of the link.
//!
//! The host encodes requests and decodes responses; the controller does the reverse.
//! Both sides are provided so a controller can be simulated against the same codec.

use crc32fast::Hasher;
use heapless::Vec;

use super::{
    Command, FOOTER_MAGIC, FOOTER_SIZE, HEADER_SIZE, MAX_BODY_SIZE, MAX_FRAME_SIZE,
    REQUEST_MAGIC, RESPONSE_MAGIC, Status,
};
use crate::error::ProtocolError;

/// A complete encoded frame, stored inline.
pub type FrameBuffer = Vec<u8, MAX_FRAME_SIZE>;

/// A decoded request frame borrowing its body from the input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Request<'a> {
    /// Requested command.
    pub command: Command,
    /// Command specific body.
    pub body: &'a [u8],
}

/// A decoded response frame borrowing its body from the input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Response<'a> {
    /// Status reported by the controller.
    pub status: Status,
    /// Command specific body.
    pub body: &'a [u8],
}

/// Total frame length for a body of `body_len` bytes.
#[must_use]
pub const fn frame_len(body_len: usize) -> usize {
    HEADER_SIZE + body_len + FOOTER_SIZE
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a host-to-controller frame.
///
/// # Errors
///
/// Returns [`ProtocolError::BodyTooLarge`] if `body` exceeds [`MAX_BODY_SIZE`].
pub fn encode_request(command: Command, body: &[u8]) -> Result<FrameBuffer, ProtocolError> {
    encode(REQUEST_MAGIC, command.id(), body)
}

/// Encode a controller-to-host frame.
///
/// # Errors
///
/// Returns [`ProtocolError::BodyTooLarge`] if `body` exceeds [`MAX_BODY_SIZE`].
pub fn encode_response(status: Status, body: &[u8]) -> Result<FrameBuffer, ProtocolError> {
    encode(RESPONSE_MAGIC, status.code(), body)
}

fn encode(magic: u32, code: u8, body: &[u8]) -> Result<FrameBuffer, ProtocolError> {
    let too_large = ProtocolError::BodyTooLarge { size: body.len() };
    let body_len = u16::try_from(body.len()).map_err(|_| too_large)?;
    if body.len() > MAX_BODY_SIZE {
        return Err(too_large);
    }

    let mut frame = FrameBuffer::new();
    let mut append = |bytes: &[u8]| frame.extend_from_slice(bytes).map_err(|()| too_large);
    append(&magic.to_le_bytes())?;
    append(&[code])?;
    append(&body_len.to_le_bytes())?;
    append(body)?;

    let crc = compute_crc(&frame);
    frame
        .extend_from_slice(&crc.to_le_bytes())
        .and_then(|()| frame.extend_from_slice(&FOOTER_MAGIC.to_le_bytes()))
        .map_err(|()| too_large)?;
    Ok(frame)
}

// ============================================================================
// Decoding - piecewise, as bytes arrive from the link
// ============================================================================

/// Decode a response header, returning the status and announced body length.
///
/// # Errors
///
/// Returns [`ProtocolError::BadHeaderMagic`] or [`ProtocolError::BodyTooLarge`].
pub fn decode_response_header(header: &[u8; HEADER_SIZE]) -> Result<(Status, usize), ProtocolError> {
    let (code, body_len) = decode_header(header, RESPONSE_MAGIC)?;
    Ok((Status::from_code(code), body_len))
}

/// Decode a request header, returning the command and announced body length.
///
/// # Errors
///
/// Returns [`ProtocolError::BadHeaderMagic`], [`ProtocolError::UnknownCommand`] or
/// [`ProtocolError::BodyTooLarge`].
pub fn decode_request_header(header: &[u8; HEADER_SIZE]) -> Result<(Command, usize), ProtocolError> {
    let (code, body_len) = decode_header(header, REQUEST_MAGIC)?;
    let command = Command::from_id(code).ok_or(ProtocolError::UnknownCommand(code))?;
    Ok((command, body_len))
}

fn decode_header(header: &[u8; HEADER_SIZE], expected_magic: u32) -> Result<(u8, usize), ProtocolError> {
    let [m0, m1, m2, m3, code, s0, s1] = *header;
    let magic = u32::from_le_bytes([m0, m1, m2, m3]);
    if magic != expected_magic {
        return Err(ProtocolError::BadHeaderMagic { found: magic });
    }
    let body_len = usize::from(u16::from_le_bytes([s0, s1]));
    if body_len > MAX_BODY_SIZE {
        return Err(ProtocolError::BodyTooLarge { size: body_len });
    }
    Ok((code, body_len))
}

/// Check a footer against the header and body it closes.
///
/// A CRC of zero is accepted: some controller firmware never fills it in.
///
/// # Errors
///
/// Returns [`ProtocolError::BadFooterMagic`] or [`ProtocolError::CrcMismatch`].
pub fn check_footer(
    header: &[u8; HEADER_SIZE],
    body: &[u8],
    footer: &[u8; FOOTER_SIZE],
) -> Result<(), ProtocolError> {
    let [c0, c1, c2, c3, m0, m1, m2, m3] = *footer;
    let magic = u32::from_le_bytes([m0, m1, m2, m3]);
    if magic != FOOTER_MAGIC {
        return Err(ProtocolError::BadFooterMagic { found: magic });
    }

    let received = u32::from_le_bytes([c0, c1, c2, c3]);
    if received != 0 {
        let mut hasher = Hasher::new();
        hasher.update(header);
        hasher.update(body);
        let computed = hasher.finalize();
        if computed != received {
            return Err(ProtocolError::CrcMismatch { computed, received });
        }
    }
    Ok(())
}

// ============================================================================
// Decoding - whole frames
// ============================================================================

/// Decode a complete request frame (controller side).
///
/// # Errors
///
/// Returns a [`ProtocolError`] if the frame is truncated or malformed.
pub fn decode_request(frame: &[u8]) -> Result<Request<'_>, ProtocolError> {
    let (header, rest) = split_header(frame)?;
    let (command, body_len) = decode_request_header(header)?;
    let body = split_body(frame, header, rest, body_len)?;
    Ok(Request { command, body })
}

/// Decode a complete response frame (host side).
///
/// # Errors
///
/// Returns a [`ProtocolError`] if the frame is truncated or malformed.
pub fn decode_response(frame: &[u8]) -> Result<Response<'_>, ProtocolError> {
    let (header, rest) = split_header(frame)?;
    let (status, body_len) = decode_response_header(header)?;
    let body = split_body(frame, header, rest, body_len)?;
    Ok(Response { status, body })
}

fn split_header(frame: &[u8]) -> Result<(&[u8; HEADER_SIZE], &[u8]), ProtocolError> {
    frame
        .split_first_chunk::<HEADER_SIZE>()
        .ok_or(ProtocolError::Truncated {
            expected: HEADER_SIZE,
            found: frame.len(),
        })
}

fn split_body<'a>(
    frame: &'a [u8],
    header: &[u8; HEADER_SIZE],
    rest: &'a [u8],
    body_len: usize,
) -> Result<&'a [u8], ProtocolError> {
    let truncated = ProtocolError::Truncated {
        expected: frame_len(body_len),
        found: frame.len(),
    };
    let (body, rest) = rest.split_at_checked(body_len).ok_or(truncated)?;
    let (footer, _) = rest.split_first_chunk::<FOOTER_SIZE>().ok_or(truncated)?;
    check_footer(header, body, footer)?;
    Ok(body)
}

/// Compute CRC32 checksum.
fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
