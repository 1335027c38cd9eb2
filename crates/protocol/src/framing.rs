//! Frame codec for the onboarding socket.
//!
//! Every frame is ASCII text of the form
//!
//! ```text
//! L:<n> <json>\n
//! ```
//!
//! where `<n>` is the byte length of `<json>` alone. Devices may pad frames
//! with NUL bytes, which are removed before parsing.
//!
//! By default the length tag is skipped without being checked, which is
//! what deployed firmware expects. [`MessageCodec::strict`] checks it.

use serde::de::DeserializeOwned;

use crate::error::{ProtocolError, Result};
use crate::messages::{ExecutableCommand, SocketEvent};

/// Prefix of the length tag.
pub const FRAME_TAG_PREFIX: &str = "L:";

/// Separator between the length tag and the JSON body.
pub const FRAME_SEPARATOR: char = ' ';

/// Byte terminating every frame.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Padding byte stripped from inbound frames.
pub const FRAME_PADDING: char = '\0';

/// Encoder/decoder for onboarding frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCodec {
    validate_length: bool,
}

impl MessageCodec {
    /// Lenient codec: the length tag is discarded unchecked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec that rejects frames whose length tag disagrees with the body.
    pub fn strict() -> Self {
        Self {
            validate_length: true,
        }
    }

    /// Codec with length validation switched on or off.
    pub fn with_length_validation(validate_length: bool) -> Self {
        Self { validate_length }
    }

    /// Whether this codec validates the length tag.
    pub fn validates_length(&self) -> bool {
        self.validate_length
    }

    /// Encode an outbound command into a complete frame.
    pub fn encode(&self, command: &ExecutableCommand) -> Result<Vec<u8>> {
        let json = serde_json::to_string(command)?;
        Ok(frame(&json))
    }

    /// Encode an inbound event into a frame, as a device would send it.
    pub fn encode_event(&self, event: &SocketEvent) -> Result<Vec<u8>> {
        let json = serde_json::to_string(event)?;
        Ok(frame(&json))
    }

    /// Decode one received chunk into an event.
    pub fn decode(&self, chunk: &[u8]) -> Result<SocketEvent> {
        self.decode_as(chunk)
    }

    /// Decode one received chunk into a command, as a device would.
    pub fn decode_command(&self, chunk: &[u8]) -> Result<ExecutableCommand> {
        self.decode_as(chunk)
    }

    fn decode_as<T: DeserializeOwned>(&self, chunk: &[u8]) -> Result<T> {
        let body = self.unframe(chunk)?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Strip the length tag and padding, returning the JSON body.
    fn unframe(&self, chunk: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(chunk)
            .map_err(|e| ProtocolError::InvalidFrame(format!("not UTF-8: {}", e)))?;

        let (tag, rest) = text
            .split_once(FRAME_SEPARATOR)
            .ok_or_else(|| ProtocolError::InvalidFrame("missing length tag".to_string()))?;

        let body: String = rest.chars().filter(|c| *c != FRAME_PADDING).collect();

        if self.validate_length {
            let declared = parse_length_tag(tag)?;
            let actual = body
                .strip_suffix(FRAME_TERMINATOR as char)
                .unwrap_or(&body)
                .len();
            if declared != actual {
                return Err(ProtocolError::InvalidFrame(format!(
                    "length tag says {} bytes, body has {}",
                    declared, actual
                )));
            }
        }

        Ok(body)
    }
}

fn frame(json: &str) -> Vec<u8> {
    let mut out = format!("{}{}{}{}", FRAME_TAG_PREFIX, json.len(), FRAME_SEPARATOR, json)
        .into_bytes();
    out.push(FRAME_TERMINATOR);
    out
}

fn parse_length_tag(tag: &str) -> Result<usize> {
    let digits = tag
        .trim_start_matches(FRAME_PADDING)
        .strip_prefix(FRAME_TAG_PREFIX)
        .ok_or_else(|| ProtocolError::InvalidFrame(format!("bad length tag: {:?}", tag)))?;
    digits
        .parse()
        .map_err(|_| ProtocolError::InvalidFrame(format!("bad length tag: {:?}", tag)))
}
