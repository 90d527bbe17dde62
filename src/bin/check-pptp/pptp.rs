//! The PPTP Start-Control-Connection exchange (RFC 2637 section 2.1 and 2.2)
//!
//! Both messages are 156 bytes, big-endian, with fixed offsets:
//!
//! ```plain
//! offset width  request (SCCRQ)            reply (SCCRP)
//!      0     2  length = 156               length = 156
//!      2     2  message type = 1 (control) message type = 1
//!      4     4  magic cookie 0x1A2B3C4D    magic cookie
//!      8     2  control type = 1           control type = 2
//!     10     2  reserved                   reserved
//!     12     2  protocol version 0x0100    protocol version
//!     14     1  reserved                   result code
//!     15     1  reserved                   error code
//!     16     4  framing capabilities       framing capabilities
//!     20     4  bearer capabilities        bearer capabilities
//!     24     2  maximum channels           maximum channels
//!     26     2  firmware revision          firmware revision
//!     28    64  host name                  host name
//!     92    64  vendor string              vendor string
//! ```

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

pub const MESSAGE_LEN: usize = 156;
pub const MAGIC_COOKIE: u32 = 0x1A2B_3C4D;
const CONTROL_MESSAGE: u16 = 1;
const START_CONTROL_CONNECTION_REQUEST: u16 = 1;
const START_CONTROL_CONNECTION_REPLY: u16 = 2;
const PROTOCOL_VERSION: u16 = 0x0100;
const NAME_LEN: usize = 64;

/// Asynchronous and synchronous framing
const FRAMING_CAPABILITIES: u32 = 0x3;
/// Analog and digital access
const BEARER_CAPABILITIES: u32 = 0x3;

/// Result code meaning the control connection was established
pub const RESULT_SUCCESS: u8 = 1;
/// Result code that says "look at the error code"
pub const RESULT_GENERAL_ERROR: u8 = 2;

/// Build the request we send to the server
pub fn start_control_connection_request(hostname: &str, vendor: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(MESSAGE_LEN);
    buf.put_u16(MESSAGE_LEN as u16);
    buf.put_u16(CONTROL_MESSAGE);
    buf.put_u32(MAGIC_COOKIE);
    buf.put_u16(START_CONTROL_CONNECTION_REQUEST);
    buf.put_u16(0);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u16(0);
    buf.put_u32(FRAMING_CAPABILITIES);
    buf.put_u32(BEARER_CAPABILITIES);
    buf.put_u16(0); // maximum channels, always 0 from a PNS
    buf.put_u16(0); // firmware revision
    put_name(&mut buf, hostname);
    put_name(&mut buf, vendor);
    buf
}

fn put_name(buf: &mut BytesMut, name: &str) {
    // leave room for the terminating NUL
    let bytes = &name.as_bytes()[..name.len().min(NAME_LEN - 1)];
    buf.put_slice(bytes);
    buf.put_bytes(0, NAME_LEN - bytes.len());
}

/// A decoded Start-Control-Connection-Reply
#[derive(Debug, Clone, PartialEq)]
pub struct StartControlConnectionReply {
    pub protocol_version: u16,
    pub result_code: u8,
    pub error_code: u8,
    pub framing_capabilities: u32,
    pub bearer_capabilities: u32,
    pub maximum_channels: u16,
    pub firmware_revision: u16,
    pub hostname: String,
    pub vendor: String,
}

#[derive(Debug, PartialEq)]
pub enum DecodeError {
    Short { got: usize },
    Length(u16),
    MessageType(u16),
    MagicCookie(u32),
    ControlType(u16),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DecodeError::Short { got } => write!(
                f,
                "short reply: got {} bytes, expected {}",
                got, MESSAGE_LEN
            ),
            DecodeError::Length(len) => write!(f, "reply declares length {}, expected {}", len, MESSAGE_LEN),
            DecodeError::MessageType(t) => write!(f, "reply is not a control message (type {})", t),
            DecodeError::MagicCookie(c) => write!(f, "bad magic cookie 0x{:08X}", c),
            DecodeError::ControlType(t) => write!(
                f,
                "expected Start-Control-Connection-Reply (2), got control message type {}",
                t
            ),
        }
    }
}

/// Decode the server's reply
///
/// Anything shorter than a full message, or with the wrong framing fields, is
/// a `DecodeError`. Trailing bytes are ignored.
pub fn decode_reply(input: &[u8]) -> Result<StartControlConnectionReply, DecodeError> {
    if input.len() < MESSAGE_LEN {
        return Err(DecodeError::Short { got: input.len() });
    }
    let mut buf = &input[..MESSAGE_LEN];

    let length = buf.get_u16();
    if length as usize != MESSAGE_LEN {
        return Err(DecodeError::Length(length));
    }
    let message_type = buf.get_u16();
    if message_type != CONTROL_MESSAGE {
        return Err(DecodeError::MessageType(message_type));
    }
    let cookie = buf.get_u32();
    if cookie != MAGIC_COOKIE {
        return Err(DecodeError::MagicCookie(cookie));
    }
    let control_type = buf.get_u16();
    if control_type != START_CONTROL_CONNECTION_REPLY {
        return Err(DecodeError::ControlType(control_type));
    }
    buf.advance(2); // reserved

    let protocol_version = buf.get_u16();
    let result_code = buf.get_u8();
    let error_code = buf.get_u8();
    let framing_capabilities = buf.get_u32();
    let bearer_capabilities = buf.get_u32();
    let maximum_channels = buf.get_u16();
    let firmware_revision = buf.get_u16();
    let hostname = take_name(&mut buf);
    let vendor = take_name(&mut buf);

    Ok(StartControlConnectionReply {
        protocol_version,
        result_code,
        error_code,
        framing_capabilities,
        bearer_capabilities,
        maximum_channels,
        firmware_revision,
        hostname,
        vendor,
    })
}

fn take_name(buf: &mut &[u8]) -> String {
    let field = &buf[..NAME_LEN];
    let end = field.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
    let name = String::from_utf8_lossy(&field[..end]).trim().to_owned();
    buf.advance(NAME_LEN);
    name
}

impl StartControlConnectionReply {
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_SUCCESS
    }

    /// `major.minor`
    pub fn version(&self) -> String {
        format!("{}.{}", self.protocol_version >> 8, self.protocol_version & 0xff)
    }

    /// Why the server refused us, in words
    pub fn failure_reason(&self) -> String {
        let result = result_text(self.result_code)
            .map_or_else(|| format!("unknown result code {}", self.result_code), str::to_owned);
        if self.result_code == RESULT_GENERAL_ERROR {
            let error = error_text(self.error_code)
                .map_or_else(|| format!("unknown error code {}", self.error_code), str::to_owned);
            format!("{}: {}", result, error)
        } else {
            result
        }
    }
}

/// Result codes of a Start-Control-Connection-Reply
pub fn result_text(code: u8) -> Option<&'static str> {
    Some(match code {
        1 => "successful channel establishment",
        2 => "general error",
        3 => "command channel already exists",
        4 => "requester is not authorized to establish a command channel",
        5 => "the protocol version of the requester is not supported",
        _ => return None,
    })
}

/// General error codes, meaningful when the result code is 2
pub fn error_text(code: u8) -> Option<&'static str> {
    Some(match code {
        0 => "no general error",
        1 => "no control connection exists yet",
        2 => "length is wrong or magic cookie is wrong",
        3 => "one of the field values was out of range or a reserved field was non-zero",
        4 => "insufficient resources to handle this command now",
        5 => "the call id is invalid in this context",
        6 => "a generic vendor-specific error occurred in the PAC",
        _ => return None,
    })
}
