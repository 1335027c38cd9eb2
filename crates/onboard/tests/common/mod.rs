//! Shared fixtures: in-memory transports and a scripted device peer.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use softap_onboard::network::socket::{
    BoxedReader, BoxedWriter, ChannelConfig, ChannelStatus, SocketTarget, StreamConnector,
    StreamState,
};
use softap_onboard::network::BoxFuture;
use softap_protocol::{ExecutableCommand, MessageCodec, SocketEvent};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Channel settings with a short debounce so tests stay quick.
pub fn fast_channel_config() -> ChannelConfig {
    ChannelConfig::default().with_debounce(Duration::from_millis(20))
}

/// Connector handing out in-memory sockets.
///
/// The device end of every connection is delivered to the test as a
/// [`DevicePeer`].
pub struct DuplexConnector {
    peers: mpsc::UnboundedSender<DevicePeer>,
    connects: AtomicUsize,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DevicePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            connects: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl StreamConnector for DuplexConnector {
    fn connect<'a>(
        &'a self,
        _target: &'a SocketTarget,
    ) -> BoxFuture<'a, io::Result<(BoxedReader, BoxedWriter)>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let (client, device) = tokio::io::duplex(64 * 1024);
            self.peers
                .send(DevicePeer::new(device))
                .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "no device"))?;
            let (reader, writer) = tokio::io::split(client);
            Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
        })
    }
}

/// Connector whose every attempt is refused.
#[derive(Default)]
pub struct RefusingConnector {
    connects: AtomicUsize,
}

impl RefusingConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl StreamConnector for RefusingConnector {
    fn connect<'a>(
        &'a self,
        _target: &'a SocketTarget,
    ) -> BoxFuture<'a, io::Result<(BoxedReader, BoxedWriter)>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        })
    }
}

/// The device end of an in-memory socket.
pub struct DevicePeer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    codec: MessageCodec,
}

impl DevicePeer {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            codec: MessageCodec::new(),
        }
    }

    /// Read one raw frame, terminator included.
    pub async fn read_frame(&mut self) -> Vec<u8> {
        let mut frame = Vec::new();
        tokio::time::timeout(WAIT, self.reader.read_until(b'\n', &mut frame))
            .await
            .expect("timed out reading frame")
            .expect("read failed");
        frame
    }

    /// Read and decode one command.
    pub async fn read_command(&mut self) -> ExecutableCommand {
        let frame = self.read_frame().await;
        self.codec.decode_command(&frame).expect("undecodable command")
    }

    pub async fn send_event(&mut self, event: &SocketEvent) {
        let frame = self.codec.encode_event(event).unwrap();
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }
}

/// Wait for the next device connection.
pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<DevicePeer>) -> DevicePeer {
    tokio::time::timeout(WAIT, peers.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("connector dropped")
}

/// Wait until the merged status reports `Open`.
pub async fn wait_for_open(status: &mut ChannelStatus) {
    loop {
        let state = tokio::time::timeout(WAIT, status.next())
            .await
            .expect("timed out waiting for open");
        match state {
            Some(StreamState::Open) => return,
            Some(StreamState::Uninitialized) => continue,
            other => panic!("Expected socket to open, got {other:?}"),
        }
    }
}
