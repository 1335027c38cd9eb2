//! # SoftAP Onboarding Protocol Library
//!
//! This crate provides the wire protocol and encryption envelope used to
//! talk to an unconfigured device over its temporary access point.
//!
//! ## Overview
//!
//! The protocol crate is runtime-free. It provides:
//!
//! - **Message Definitions**: commands, typed response events and the access point descriptor
//! - **Frame Codec**: `L:<n> <json>\n` text frames
//! - **Encryption Envelope**: AES-GCM for credential fields, RSA for the backend exchange
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Commands / Socket Events (JSON)     │  opType / opStatus / opData
//! ├─────────────────────────────────────────┤
//! │       Credential Field Encryption       │  AES-256-GCM, optional
//! ├─────────────────────────────────────────┤
//! │                Framing                  │  L:<n> <json>\n
//! ├─────────────────────────────────────────┤
//! │          Transport (TCP socket)         │  192.168.1.1:50000
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use softap_protocol::{ConnectionCommand, MessageCodec, WiFiCredentials};
//!
//! let codec = MessageCodec::new();
//! let command = ConnectionCommand::SetWiFiCredentials(Some(WiFiCredentials::new("Home", "secret")));
//! let frame = codec.encode(&command.executable()).unwrap();
//! assert!(frame.starts_with(b"L:"));
//!
//! let reply = b"L:42 {\"opType\":\"setWiFiCredentials\",\"opStatus\":\"SUCCESS\"}\n";
//! let event = codec.decode(reply).unwrap();
//! assert_eq!(event.kind, command);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Commands, events and payloads
//! - [`framing`]: Frame codec
//! - [`crypto`]: Symmetric and asymmetric encryptors
//! - [`error`]: Error types

pub mod crypto;
pub mod error;
pub mod framing;
pub mod messages;

pub use crypto::{Encryptor, MessageEncryptor, OnboardingEncryptor, RSA_KEY_BITS};
pub use error::{ProtocolError, Result};
pub use framing::{MessageCodec, FRAME_TAG_PREFIX, FRAME_TERMINATOR};
pub use messages::{
    AccessPointDescriptor, ClaimState, ClaimStatus, ConnectionCommand, ConnectivityState,
    ConnectivityStatus, ErrorMessage, EventPayload, EventStatus, ExecutableCommand,
    RegisterState, RegisterStatus, SocketEvent, WiFiCredentials, WiFiNetwork, WiFiNetworks,
};
