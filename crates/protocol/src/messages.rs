//! Onboarding message definitions.
//!
//! Outbound traffic is a single [`ExecutableCommand`] shape serialized as
//! `{"opType": ..., "opData": ...}`. Inbound traffic is a [`SocketEvent`]
//! whose payload type is selected by the command it answers.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::crypto::Encryptor;
use crate::error::{ProtocolError, Result};

/// Message synthesized when a failed event carries no error payload.
pub const DEFAULT_ERROR_MESSAGE: &str = "Error decoding data";

// ============================================================================
// Commands
// ============================================================================

/// Command understood by the device's onboarding socket.
///
/// Equality compares the variant only. Two `SetWiFiCredentials` values are
/// equal whatever credentials they carry, which is what lets a response
/// (that never echoes the payload) be matched to its request.
#[derive(Debug, Clone)]
pub enum ConnectionCommand {
    /// Query whether the device is claimed.
    ClaimStatus,
    /// List the networks the device can see.
    WiFiNetworks,
    /// Query backend registration state.
    RegisterStatus,
    /// Ask the device to forget its credentials and rescan.
    ChangeNetworkCredentials,
    /// Query the device's upstream connectivity.
    ConnectivityStatus,
    /// Provision Wi-Fi credentials.
    SetWiFiCredentials(Option<WiFiCredentials>),
}

impl ConnectionCommand {
    /// Every command, in wire-table order.
    pub const ALL: [ConnectionCommand; 6] = [
        ConnectionCommand::ClaimStatus,
        ConnectionCommand::WiFiNetworks,
        ConnectionCommand::RegisterStatus,
        ConnectionCommand::ChangeNetworkCredentials,
        ConnectionCommand::ConnectivityStatus,
        ConnectionCommand::SetWiFiCredentials(None),
    ];

    /// The `opType` string for this command.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            ConnectionCommand::ClaimStatus => "claimStatus",
            ConnectionCommand::WiFiNetworks => "getWiFiNetworks",
            ConnectionCommand::RegisterStatus => "getRegisterStatus",
            ConnectionCommand::ChangeNetworkCredentials => "changeNetworkCredentials",
            ConnectionCommand::ConnectivityStatus => "getConnectivityStatus",
            ConnectionCommand::SetWiFiCredentials(_) => "setWiFiCredentials",
        }
    }

    /// Look up a command by its `opType` string.
    ///
    /// `setWiFiCredentials` maps to a variant without credentials.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.wire_name() == name)
    }

    /// Build the outbound envelope for this command.
    ///
    /// Only `SetWiFiCredentials` contributes `opData`.
    pub fn executable(&self) -> ExecutableCommand {
        let credentials = match self {
            ConnectionCommand::SetWiFiCredentials(credentials) => credentials.clone(),
            _ => None,
        };
        ExecutableCommand {
            command: self.clone(),
            credentials,
        }
    }
}

impl PartialEq for ConnectionCommand {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl Eq for ConnectionCommand {}

impl fmt::Display for ConnectionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl Serialize for ConnectionCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_name())
    }
}

impl<'de> Deserialize<'de> for ConnectionCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        ConnectionCommand::from_wire_name(&name).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown opType: {}", name))
        })
    }
}

/// Outbound command envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableCommand {
    /// Command being issued.
    #[serde(rename = "opType")]
    pub command: ConnectionCommand,
    /// Credentials for `SetWiFiCredentials`.
    #[serde(rename = "opData", default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<WiFiCredentials>,
}

impl ExecutableCommand {
    /// Encrypt the credential fields in place, if any are present.
    pub fn encrypt(&mut self, encryptor: &dyn Encryptor) -> Result<()> {
        match self.credentials.as_mut() {
            Some(credentials) => credentials.encrypt(encryptor),
            None => Ok(()),
        }
    }
}

/// Wi-Fi network credentials handed to the device.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiFiCredentials {
    /// Network name.
    pub ssid: String,
    /// Network password.
    pub password: String,
}

impl WiFiCredentials {
    /// Create new credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }

    /// Replace both fields with base64 ciphertext.
    ///
    /// Fields are only replaced once both encrypt successfully.
    pub fn encrypt(&mut self, encryptor: &dyn Encryptor) -> Result<()> {
        let ssid = STANDARD.encode(encryptor.encrypt(&self.ssid)?);
        let password = STANDARD.encode(encryptor.encrypt(&self.password)?);
        self.ssid = ssid;
        self.password = password;
        Ok(())
    }
}

impl fmt::Debug for WiFiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WiFiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// A network visible to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiFiNetwork {
    pub ssid: String,
    pub encrypt: String,
    pub band: String,
    pub rssi: i32,
}

/// Response to `getWiFiNetworks` and `changeNetworkCredentials`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiFiNetworks {
    pub wifi_networks: Vec<WiFiNetwork>,
}

/// Claim state reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimState {
    Claimed,
    Unclaimed,
}

/// Response to `claimStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatus {
    pub claim_status: ClaimState,
    pub claim_code: String,
    #[serde(default)]
    pub wifi_networks: Vec<WiFiNetwork>,
}

/// Registration state reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterState {
    Ready,
    Waiting,
}

/// Response to `getRegisterStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterStatus {
    pub register_status: RegisterState,
    pub claim_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_cloud_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

/// Upstream connectivity reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Connected,
    Connecting,
    Disconnected,
    #[serde(other)]
    Unknown,
}

/// Response to `getConnectivityStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityStatus {
    pub connectivity_status: ConnectivityState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
}

/// Error payload of a failed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

impl ErrorMessage {
    /// Create an error payload.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for ErrorMessage {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_MESSAGE)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Outcome reported in `opStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "UNKNOWN", other)]
    Unknown,
}

/// Typed `opData` of an inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    ClaimStatus(ClaimStatus),
    WiFiNetworks(WiFiNetworks),
    RegisterStatus(RegisterStatus),
    ConnectivityStatus(ConnectivityStatus),
    Error(ErrorMessage),
}

/// Inbound message from the device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSocketEvent")]
pub struct SocketEvent {
    /// Command this event answers.
    pub kind: ConnectionCommand,
    /// Reported outcome.
    pub status: EventStatus,
    /// Payload selected by `kind` on success, or the error payload.
    pub data: Option<EventPayload>,
}

impl SocketEvent {
    /// Successful event carrying `data`.
    pub fn success(kind: ConnectionCommand, data: Option<EventPayload>) -> Self {
        Self {
            kind,
            status: EventStatus::Success,
            data,
        }
    }

    /// Failed event carrying an error message.
    pub fn failure(kind: ConnectionCommand, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: EventStatus::Error,
            data: Some(EventPayload::Error(ErrorMessage::new(message))),
        }
    }

    /// Whether the device reported success.
    pub fn is_success(&self) -> bool {
        self.status == EventStatus::Success
    }

    /// The error payload, if this event failed.
    pub fn error_message(&self) -> Option<&ErrorMessage> {
        match &self.data {
            Some(EventPayload::Error(message)) => Some(message),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawSocketEvent {
    #[serde(rename = "opType")]
    op_type: ConnectionCommand,
    #[serde(rename = "opStatus", default)]
    op_status: Option<EventStatus>,
    #[serde(rename = "opData", default)]
    op_data: Option<Value>,
}

#[derive(Serialize)]
struct RawSocketEventRef<'a> {
    #[serde(rename = "opType")]
    op_type: &'a ConnectionCommand,
    #[serde(rename = "opStatus")]
    op_status: EventStatus,
    #[serde(rename = "opData", skip_serializing_if = "Option::is_none")]
    op_data: Option<&'a EventPayload>,
}

fn required_payload<T: serde::de::DeserializeOwned>(
    kind: &ConnectionCommand,
    data: Option<Value>,
) -> Result<T> {
    let value = data
        .filter(|v| !v.is_null())
        .ok_or_else(|| ProtocolError::Deserialization(format!("{} event is missing opData", kind)))?;
    Ok(serde_json::from_value(value)?)
}

impl TryFrom<RawSocketEvent> for SocketEvent {
    type Error = ProtocolError;

    fn try_from(raw: RawSocketEvent) -> Result<Self> {
        let kind = raw.op_type;
        let status = raw.op_status.unwrap_or(EventStatus::Error);

        let data = if status != EventStatus::Success {
            let message = match raw.op_data.filter(|v| !v.is_null()) {
                Some(value) => serde_json::from_value(value)?,
                None => ErrorMessage::default(),
            };
            Some(EventPayload::Error(message))
        } else {
            match kind {
                ConnectionCommand::ClaimStatus => Some(EventPayload::ClaimStatus(
                    required_payload(&kind, raw.op_data)?,
                )),
                ConnectionCommand::WiFiNetworks | ConnectionCommand::ChangeNetworkCredentials => {
                    Some(EventPayload::WiFiNetworks(required_payload(
                        &kind,
                        raw.op_data,
                    )?))
                }
                ConnectionCommand::RegisterStatus => Some(EventPayload::RegisterStatus(
                    required_payload(&kind, raw.op_data)?,
                )),
                ConnectionCommand::ConnectivityStatus => Some(EventPayload::ConnectivityStatus(
                    required_payload(&kind, raw.op_data)?,
                )),
                ConnectionCommand::SetWiFiCredentials(_) => None,
            }
        };

        Ok(SocketEvent { kind, status, data })
    }
}

impl Serialize for SocketEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawSocketEventRef {
            op_type: &self.kind,
            op_status: self.status,
            op_data: self.data.as_ref(),
        }
        .serialize(serializer)
    }
}

// ============================================================================
// Access point
// ============================================================================

fn encrypted_by_default() -> bool {
    true
}

/// The temporary access point advertised by an unconfigured device.
///
/// Descriptors delivered by the backend arrive encrypted against the
/// onboarding public key. [`decrypt`](Self::decrypt) is a one-way
/// transition: once it succeeds, `ssid` and `passphrase` hold plaintext.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AccessPointDescriptor {
    #[serde(rename = "softAPSSID")]
    ssid: String,
    #[serde(rename = "softAPPasswd")]
    passphrase: String,
    #[serde(rename = "isAPSupported")]
    ap_supported: bool,
    #[serde(rename = "isBSSupported")]
    bs_supported: bool,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(skip, default = "encrypted_by_default")]
    encrypted: bool,
}

impl AccessPointDescriptor {
    /// Descriptor for a known plaintext access point.
    pub fn new(ssid: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            passphrase: passphrase.into(),
            ap_supported: true,
            bs_supported: false,
            uuid: None,
            encrypted: false,
        }
    }

    /// Attach the device uuid.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Set the advertised capabilities.
    pub fn with_capabilities(mut self, ap_supported: bool, bs_supported: bool) -> Self {
        self.ap_supported = ap_supported;
        self.bs_supported = bs_supported;
        self
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn is_ap_supported(&self) -> bool {
        self.ap_supported
    }

    pub fn is_bs_supported(&self) -> bool {
        self.bs_supported
    }

    /// Whether `ssid` and `passphrase` still hold ciphertext.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Name of the network to join.
    pub fn network_name(&self) -> &str {
        &self.ssid
    }

    /// Seed for the symmetric message key.
    pub fn shared_secret(&self) -> String {
        format!(
            "{}{}{}",
            self.uuid.as_deref().unwrap_or_default(),
            self.ssid,
            self.passphrase
        )
    }

    /// Decrypt `ssid` and `passphrase` in place.
    ///
    /// Does nothing on an already decrypted descriptor. On failure the
    /// descriptor is left untouched and still encrypted.
    pub fn decrypt(&mut self, encryptor: &dyn Encryptor) -> Result<()> {
        if !self.encrypted {
            return Ok(());
        }
        let ssid = encryptor.decrypt(&STANDARD.decode(&self.ssid)?)?;
        let passphrase = encryptor.decrypt(&STANDARD.decode(&self.passphrase)?)?;
        self.ssid = ssid;
        self.passphrase = passphrase;
        self.encrypted = false;
        Ok(())
    }
}

impl fmt::Debug for AccessPointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPointDescriptor")
            .field("ssid", &self.ssid)
            .field("passphrase", &"[REDACTED]")
            .field("ap_supported", &self.ap_supported)
            .field("bs_supported", &self.bs_supported)
            .field("uuid", &self.uuid)
            .field("encrypted", &self.encrypted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reverses bytes; enough to observe that fields were transformed.
    struct ReversingEncryptor;

    impl Encryptor for ReversingEncryptor {
        fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
            Ok(plaintext.bytes().rev().collect())
        }

        fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
            let bytes: Vec<u8> = ciphertext.iter().rev().copied().collect();
            String::from_utf8(bytes).map_err(|e| ProtocolError::DecryptFailed(e.to_string()))
        }
    }

    struct FailingEncryptor;

    impl Encryptor for FailingEncryptor {
        fn encrypt(&self, _: &str) -> Result<Vec<u8>> {
            Err(ProtocolError::MissingKey)
        }

        fn decrypt(&self, _: &[u8]) -> Result<String> {
            Err(ProtocolError::MissingKey)
        }
    }

    #[test]
    fn test_wire_names() {
        let names: Vec<&str> = ConnectionCommand::ALL.iter().map(|c| c.wire_name()).collect();
        assert_eq!(
            names,
            vec![
                "claimStatus",
                "getWiFiNetworks",
                "getRegisterStatus",
                "changeNetworkCredentials",
                "getConnectivityStatus",
                "setWiFiCredentials",
            ]
        );
    }

    #[test]
    fn test_from_wire_name() {
        for cmd in ConnectionCommand::ALL {
            assert_eq!(ConnectionCommand::from_wire_name(cmd.wire_name()), Some(cmd));
        }
        assert_eq!(ConnectionCommand::from_wire_name("reboot"), None);
    }

    #[test]
    fn test_equality_ignores_credentials() {
        let a = ConnectionCommand::SetWiFiCredentials(Some(WiFiCredentials::new("a", "1")));
        let b = ConnectionCommand::SetWiFiCredentials(Some(WiFiCredentials::new("b", "2")));
        assert_eq!(a, b);
        assert_eq!(a, ConnectionCommand::SetWiFiCredentials(None));
        assert_ne!(a, ConnectionCommand::ClaimStatus);
    }

    #[test]
    fn test_executable_without_payload() {
        let json = serde_json::to_string(&ConnectionCommand::ClaimStatus.executable()).unwrap();
        assert_eq!(json, r#"{"opType":"claimStatus"}"#);
    }

    #[test]
    fn test_executable_set_credentials() {
        let cmd = ConnectionCommand::SetWiFiCredentials(Some(WiFiCredentials::new("Home", "secret")));
        let json = serde_json::to_string(&cmd.executable()).unwrap();
        assert_eq!(
            json,
            r#"{"opType":"setWiFiCredentials","opData":{"ssid":"Home","password":"secret"}}"#
        );
    }

    #[test]
    fn test_executable_set_credentials_absent() {
        let cmd = ConnectionCommand::SetWiFiCredentials(None);
        let json = serde_json::to_string(&cmd.executable()).unwrap();
        assert_eq!(json, r#"{"opType":"setWiFiCredentials"}"#);
    }

    #[test]
    fn test_credentials_encrypt_replaces_fields() {
        let mut exec =
            ConnectionCommand::SetWiFiCredentials(Some(WiFiCredentials::new("Home", "secret")))
                .executable();
        exec.encrypt(&ReversingEncryptor).unwrap();

        let creds = exec.credentials.unwrap();
        assert_eq!(creds.ssid, STANDARD.encode("emoH"));
        assert_eq!(creds.password, STANDARD.encode("terces"));
    }

    #[test]
    fn test_credentials_encrypt_failure_leaves_fields() {
        let mut creds = WiFiCredentials::new("Home", "secret");
        assert!(creds.encrypt(&FailingEncryptor).is_err());
        assert_eq!(creds, WiFiCredentials::new("Home", "secret"));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", WiFiCredentials::new("Home", "hunter2"));
        assert!(debug.contains("Home"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_decode_claim_status_event() {
        let json = r#"{"opType":"claimStatus","opStatus":"SUCCESS","opData":{"claimStatus":"unclaimed","claimCode":"ABC123","wifiNetworks":[]}}"#;
        let event: SocketEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.kind, ConnectionCommand::ClaimStatus);
        assert_eq!(event.status, EventStatus::Success);
        assert_eq!(
            event.data,
            Some(EventPayload::ClaimStatus(ClaimStatus {
                claim_status: ClaimState::Unclaimed,
                claim_code: "ABC123".to_string(),
                wifi_networks: vec![],
            }))
        );
    }

    #[test]
    fn test_decode_change_credentials_uses_network_list() {
        let json = r#"{"opType":"changeNetworkCredentials","opStatus":"SUCCESS","opData":{"wifiNetworks":[{"ssid":"Home","encrypt":"WPA2","band":"2.4","rssi":-40}]}}"#;
        let event: SocketEvent = serde_json::from_str(json).unwrap();

        match event.data {
            Some(EventPayload::WiFiNetworks(networks)) => {
                assert_eq!(networks.wifi_networks.len(), 1);
                assert_eq!(networks.wifi_networks[0].rssi, -40);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_decode_register_status() {
        let json = r#"{"opType":"getRegisterStatus","opStatus":"SUCCESS","opData":{"registerStatus":"ready","claimCode":"X1","xCloudId":"cloud-9"}}"#;
        let event: SocketEvent = serde_json::from_str(json).unwrap();

        match event.data {
            Some(EventPayload::RegisterStatus(status)) => {
                assert_eq!(status.register_status, RegisterState::Ready);
                assert_eq!(status.x_cloud_id.as_deref(), Some("cloud-9"));
                assert_eq!(status.model_id, None);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_decode_connectivity_unknown_state() {
        let json = r#"{"opType":"getConnectivityStatus","opStatus":"SUCCESS","opData":{"connectivityStatus":"limited"}}"#;
        let event: SocketEvent = serde_json::from_str(json).unwrap();

        assert_eq!(
            event.data,
            Some(EventPayload::ConnectivityStatus(ConnectivityStatus {
                connectivity_status: ConnectivityState::Unknown,
                ssid: None,
            }))
        );
    }

    #[test]
    fn test_decode_set_credentials_has_no_payload() {
        let json = r#"{"opType":"setWiFiCredentials","opStatus":"SUCCESS","opData":{"ignored":true}}"#;
        let event: SocketEvent = serde_json::from_str(json).unwrap();
        assert!(event.is_success());
        assert_eq!(event.data, None);
    }

    #[test]
    fn test_decode_missing_status_defaults_to_error() {
        let json = r#"{"opType":"claimStatus"}"#;
        let event: SocketEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.status, EventStatus::Error);
        assert_eq!(
            event.error_message().map(|m| m.message.as_str()),
            Some(DEFAULT_ERROR_MESSAGE)
        );
    }

    #[test]
    fn test_decode_error_with_message() {
        let json = r#"{"opType":"getWiFiNetworks","opStatus":"ERROR","opData":{"message":"scan busy"}}"#;
        let event: SocketEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.error_message(), Some(&ErrorMessage::new("scan busy")));
    }

    #[test]
    fn test_decode_unknown_status_is_not_success() {
        let json = r#"{"opType":"claimStatus","opStatus":"PENDING"}"#;
        let event: SocketEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.status, EventStatus::Unknown);
        assert!(event.error_message().is_some());
    }

    #[test]
    fn test_decode_success_without_payload_fails() {
        let json = r#"{"opType":"claimStatus","opStatus":"SUCCESS"}"#;
        assert!(serde_json::from_str::<SocketEvent>(json).is_err());
    }

    #[test]
    fn test_decode_unknown_op_type_fails() {
        let json = r#"{"opType":"reboot","opStatus":"SUCCESS"}"#;
        assert!(serde_json::from_str::<SocketEvent>(json).is_err());
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = SocketEvent::failure(ConnectionCommand::RegisterStatus, "not yet");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "opType": "getRegisterStatus",
                "opStatus": "ERROR",
                "opData": {"message": "not yet"}
            })
        );

        let parsed: SocketEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_access_point_from_backend_json() {
        let json = r#"{"softAPSSID":"c3NpZA==","softAPPasswd":"cGFzcw==","isAPSupported":true,"isBSSupported":false,"uuid":"dev-1"}"#;
        let ap: AccessPointDescriptor = serde_json::from_str(json).unwrap();

        assert!(ap.is_encrypted());
        assert!(ap.is_ap_supported());
        assert!(!ap.is_bs_supported());
        assert_eq!(ap.uuid(), Some("dev-1"));
    }

    #[test]
    fn test_access_point_decrypt_is_one_way() {
        let mut ap: AccessPointDescriptor = serde_json::from_value(serde_json::json!({
            "softAPSSID": STANDARD.encode("1-PAeciveD"),
            "softAPPasswd": STANDARD.encode("terces"),
            "isAPSupported": true,
            "isBSSupported": true,
        }))
        .unwrap();

        ap.decrypt(&ReversingEncryptor).unwrap();
        assert!(!ap.is_encrypted());
        assert_eq!(ap.ssid(), "DeviceAP-1");
        assert_eq!(ap.passphrase(), "secret");

        // A second call must not touch the plaintext.
        ap.decrypt(&ReversingEncryptor).unwrap();
        assert_eq!(ap.ssid(), "DeviceAP-1");
    }

    #[test]
    fn test_access_point_decrypt_failure_keeps_ciphertext() {
        let mut ap: AccessPointDescriptor = serde_json::from_value(serde_json::json!({
            "softAPSSID": "bm9wZQ==",
            "softAPPasswd": "bm9wZQ==",
            "isAPSupported": true,
            "isBSSupported": false,
        }))
        .unwrap();

        assert!(ap.decrypt(&FailingEncryptor).is_err());
        assert!(ap.is_encrypted());
        assert_eq!(ap.ssid(), "bm9wZQ==");
    }

    #[test]
    fn test_plaintext_access_point_stays_plaintext() {
        let mut ap = AccessPointDescriptor::new("DeviceAP-1", "secret");
        assert!(!ap.is_encrypted());

        // Nothing to decrypt, so the encryptor is never consulted
        ap.decrypt(&FailingEncryptor).unwrap();
        assert_eq!(ap.ssid(), "DeviceAP-1");
        assert_eq!(ap.passphrase(), "secret");
    }

    #[test]
    fn test_shared_secret() {
        let ap = AccessPointDescriptor::new("ssid", "pass");
        assert_eq!(ap.shared_secret(), "ssidpass");
        assert_eq!(ap.with_uuid("u-1").shared_secret(), "u-1ssidpass");
    }

    #[test]
    fn test_access_point_debug_redacts_passphrase() {
        let debug = format!("{:?}", AccessPointDescriptor::new("DeviceAP", "topsecret"));
        assert!(debug.contains("DeviceAP"));
        assert!(!debug.contains("topsecret"));
    }
}
