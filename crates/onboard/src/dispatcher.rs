//! Command dispatch and response correlation.
//!
//! Responses carry no request id, so a response is matched to its command
//! by command type alone: the first inbound event whose `opType` equals the
//! command's wins.

use std::sync::Arc;

use softap_protocol::{
    ConnectionCommand, Encryptor, MessageCodec, ProtocolError, Result, SocketEvent,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::network::socket::{ChannelStatus, DeviceSocketChannel, SocketTarget, StreamState};
use crate::network::{BoxFuture, DeviceInteraction};

/// Sends commands over a [`DeviceSocketChannel`] and awaits their responses.
pub struct CommandDispatcher {
    channel: DeviceSocketChannel,
    target: SocketTarget,
    codec: MessageCodec,
    encryptor: Arc<dyn Encryptor>,
    encrypt_credentials: bool,
}

impl CommandDispatcher {
    /// Create a dispatcher for `target`.
    ///
    /// Credential fields are run through `encryptor` only when
    /// `encrypt_credentials` is set.
    pub fn new(
        channel: DeviceSocketChannel,
        target: SocketTarget,
        encryptor: Arc<dyn Encryptor>,
        encrypt_credentials: bool,
    ) -> Self {
        let codec = channel.config().codec;
        Self {
            channel,
            target,
            codec,
            encryptor,
            encrypt_credentials,
        }
    }

    pub fn channel(&self) -> &DeviceSocketChannel {
        &self.channel
    }

    pub fn target(&self) -> &SocketTarget {
        &self.target
    }

    /// Open the underlying channel.
    pub async fn connect(&self) -> Option<ChannelStatus> {
        self.channel.open(self.target.clone()).await
    }

    /// Close the underlying channel.
    pub async fn disconnect(&self) {
        self.channel.close().await;
    }

    /// Encode and send `command` without waiting for a response.
    ///
    /// Only encoding and encryption failures are reported. A write refused
    /// by the channel is logged there and otherwise ignored.
    pub async fn execute(&self, command: &ConnectionCommand) -> Result<()> {
        self.send(command).await?;
        Ok(())
    }

    /// Encode `command` and hand it to the channel.
    ///
    /// Returns whether the channel accepted the frame.
    async fn send(&self, command: &ConnectionCommand) -> Result<bool> {
        let mut executable = command.executable();
        if self.encrypt_credentials {
            executable.encrypt(self.encryptor.as_ref())?;
        }
        let frame = self.codec.encode(&executable)?;

        // Frames may hold credentials: log the command name only
        debug!(op_type = %command, bytes = frame.len(), "Sending command");
        Ok(self.channel.send(frame).await)
    }

    /// Send `command` and resolve with the first event of the same type.
    ///
    /// Fails with [`ProtocolError::NotOpenConnection`] if the output half is
    /// not open or the channel refuses the write. The subscription is taken before the command
    /// is written so a fast reply cannot be missed. Undecodable frames never
    /// fail the returned future; callers bound the wait themselves.
    pub async fn execute_and_return_response(
        &self,
        command: ConnectionCommand,
    ) -> Result<SocketEvent> {
        if self.channel.output_state().await != StreamState::Open {
            return Err(ProtocolError::NotOpenConnection);
        }

        let mut events = self.channel.events();
        if !self.send(&command).await? {
            // Output half went away after the check above
            return Err(ProtocolError::NotOpenConnection);
        }
        wait_for_response(&mut events, &command).await
    }

    /// Subscribe to inbound events.
    pub fn events(&self) -> broadcast::Receiver<SocketEvent> {
        self.channel.events()
    }
}

async fn wait_for_response(
    events: &mut broadcast::Receiver<SocketEvent>,
    command: &ConnectionCommand,
) -> Result<SocketEvent> {
    loop {
        match events.recv().await {
            Ok(event) if event.kind == *command => {
                debug!(op_type = %event.kind, status = ?event.status, "Response received");
                return Ok(event);
            }
            Ok(event) => {
                debug!(op_type = %event.kind, waiting_for = %command, "Ignoring unrelated event");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, waiting_for = %command, "Response listener lagged behind");
            }
            Err(RecvError::Closed) => return Err(ProtocolError::InstanceDestroyed),
        }
    }
}

impl DeviceInteraction for CommandDispatcher {
    fn connect(&self) -> BoxFuture<'_, Option<ChannelStatus>> {
        Box::pin(CommandDispatcher::connect(self))
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(CommandDispatcher::disconnect(self))
    }

    fn execute(&self, command: ConnectionCommand) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { CommandDispatcher::execute(self, &command).await })
    }

    fn execute_and_return_response(
        &self,
        command: ConnectionCommand,
    ) -> BoxFuture<'_, Result<SocketEvent>> {
        Box::pin(CommandDispatcher::execute_and_return_response(self, command))
    }

    fn events(&self) -> broadcast::Receiver<SocketEvent> {
        CommandDispatcher::events(self)
    }
}
