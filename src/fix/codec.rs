//! FIX 4.2 wire codec: incremental frame decoder and serializer.
//!
//! A frame is a sequence of `tag=value` fields delimited by SOH (0x01),
//! starting with `8=FIX.4.2`, followed by `9=<BodyLength>`, the body, and
//! a trailing `10=<CheckSum>` where the checksum is the sum of all
//! preceding bytes modulo 256, rendered as three zero-padded digits.
//!
//! [`FixDecoder`] accumulates partial reads and only yields a message once
//! the full frame is buffered and validated. [`encode`] is the inverse:
//! it lays out the body in field order and computes BodyLength and
//! CheckSum over the assembled bytes.

use thiserror::Error;

use super::message::FixMessage;
use super::tag;

/// SOH byte, the FIX field delimiter.
pub const SOH: u8 = 0x01;

const BEGIN_PREFIX: &[u8] = b"8=FIX.4.2\x01";
/// "10=XXX" plus the terminating SOH.
const CHECKSUM_FIELD_LEN: usize = 7;
/// Upper bound on a declared body length; anything larger is hostile input.
const MAX_BODY_LEN: usize = 1 << 16;
/// BodyLength digits must appear within this many bytes of the prefix.
const MAX_LENGTH_FIELD: usize = 16;

/// Errors raised while decoding a frame. Every variant is fatal to the
/// connection: the transport closes without a FIX-level response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("BeginString missing or not FIX.4.2")]
    BadBeginString,

    #[error("BodyLength (tag 9) missing or malformed")]
    MalformedBodyLength,

    #[error("declared BodyLength does not match frame layout")]
    BodyLengthMismatch,

    #[error("checksum mismatch: declared {declared:03}, computed {computed:03}")]
    ChecksumMismatch { declared: u8, computed: u8 },

    #[error("field not terminated by SOH")]
    UnterminatedField,

    #[error("malformed field: {0:?}")]
    MalformedField(String),

    #[error("invalid tag number: {0:?}")]
    InvalidTag(String),

    #[error("MsgType (tag 35) absent from body")]
    MissingMsgType,

    #[error("field value is not valid ASCII")]
    NonAscii,
}

/// Sum of all byte values modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    let mut sum: u32 = 0;
    for &b in bytes {
        sum = sum.wrapping_add(b as u32);
    }
    (sum & 0xFF) as u8
}

/// Incremental FIX frame decoder.
///
/// Feed raw socket bytes with [`extend`](Self::extend) and drain complete
/// messages with [`decode_next`](Self::decode_next). Bytes of incomplete
/// frames are retained across calls.
#[derive(Debug, Default)]
pub struct FixDecoder {
    buf: Vec<u8>,
}

impl FixDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered, for diagnostics on framing failures.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Decode the next complete frame, if one is fully buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Any error leaves the
    /// buffer untouched so the caller can log the offending bytes.
    pub fn decode_next(&mut self) -> Result<Option<FixMessage>, FramingError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        // BeginString must match byte-for-byte as far as the buffer goes.
        let prefix_avail = self.buf.len().min(BEGIN_PREFIX.len());
        if self.buf[..prefix_avail] != BEGIN_PREFIX[..prefix_avail] {
            return Err(FramingError::BadBeginString);
        }
        if self.buf.len() < BEGIN_PREFIX.len() + 2 {
            return Ok(None);
        }

        // "9=<digits>\x01" immediately follows the prefix.
        let rest = &self.buf[BEGIN_PREFIX.len()..];
        if &rest[..2] != b"9=" {
            return Err(FramingError::MalformedBodyLength);
        }
        let len_end = match rest[..rest.len().min(MAX_LENGTH_FIELD)]
            .iter()
            .position(|&b| b == SOH)
        {
            Some(pos) => pos,
            None if rest.len() < MAX_LENGTH_FIELD => return Ok(None),
            None => return Err(FramingError::MalformedBodyLength),
        };
        let digits = &rest[2..len_end];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(FramingError::MalformedBodyLength);
        }
        let body_len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(FramingError::MalformedBodyLength)?;
        if body_len > MAX_BODY_LEN {
            return Err(FramingError::MalformedBodyLength);
        }

        let header_len = BEGIN_PREFIX.len() + len_end + 1;
        let total = header_len + body_len + CHECKSUM_FIELD_LEN;
        if self.buf.len() < total {
            return Ok(None);
        }

        // Trailer must be exactly "10=XXX\x01" at the declared offset.
        let trailer = &self.buf[total - CHECKSUM_FIELD_LEN..total];
        if &trailer[..3] != b"10=" || trailer[6] != SOH {
            return Err(FramingError::BodyLengthMismatch);
        }
        let chk_digits = &trailer[3..6];
        if !chk_digits.iter().all(u8::is_ascii_digit) {
            return Err(FramingError::BodyLengthMismatch);
        }
        let declared: u8 = std::str::from_utf8(chk_digits)
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .map(|v| (v & 0xFF) as u8)
            .ok_or(FramingError::BodyLengthMismatch)?;
        let computed = checksum(&self.buf[..total - CHECKSUM_FIELD_LEN]);
        if declared != computed {
            return Err(FramingError::ChecksumMismatch { declared, computed });
        }

        let body = &self.buf[header_len..total - CHECKSUM_FIELD_LEN];
        if !body.is_empty() && body[body.len() - 1] != SOH {
            return Err(FramingError::UnterminatedField);
        }

        let mut msg_type: Option<String> = None;
        let mut fields: Vec<(u32, String)> = Vec::new();
        for raw in body.split(|&b| b == SOH).filter(|f| !f.is_empty()) {
            let (t, v) = split_field(raw)?;
            if t == tag::MSG_TYPE {
                msg_type = Some(v);
            } else {
                fields.push((t, v));
            }
        }
        let msg_type = msg_type.ok_or(FramingError::MissingMsgType)?;

        self.buf.drain(..total);
        Ok(Some(FixMessage { msg_type, fields }))
    }
}

/// Split a raw `tag=value` field into its parts.
fn split_field(raw: &[u8]) -> Result<(u32, String), FramingError> {
    let text = std::str::from_utf8(raw).map_err(|_| FramingError::NonAscii)?;
    let eq = text
        .find('=')
        .ok_or_else(|| FramingError::MalformedField(text.to_string()))?;
    let tag_num: u32 = text[..eq]
        .parse()
        .map_err(|_| FramingError::InvalidTag(text[..eq].to_string()))?;
    Ok((tag_num, text[eq + 1..].to_string()))
}

/// Serialize a message to wire format, computing BodyLength and CheckSum.
///
/// The body begins with `35=<msg_type>` followed by the message's fields in
/// order; the caller is responsible for having set the header fields
/// (49, 56, 34, 52) among them.
pub fn encode(msg: &FixMessage) -> Vec<u8> {
    let mut body: Vec<u8> = Vec::with_capacity(64);
    append_field(&mut body, tag::MSG_TYPE, &msg.msg_type);
    for (t, v) in &msg.fields {
        append_field(&mut body, *t, v);
    }

    let mut out: Vec<u8> = Vec::with_capacity(BEGIN_PREFIX.len() + body.len() + 24);
    out.extend_from_slice(BEGIN_PREFIX);
    append_field(&mut out, tag::BODY_LENGTH, &body.len().to_string());
    out.extend_from_slice(&body);

    let chk = checksum(&out);
    out.extend_from_slice(format!("10={chk:03}").as_bytes());
    out.push(SOH);
    out
}

fn append_field(buf: &mut Vec<u8>, tag: u32, value: &str) {
    buf.extend_from_slice(tag.to_string().as_bytes());
    buf.push(b'=');
    buf.extend_from_slice(value.as_bytes());
    buf.push(SOH);
}
