//! Device socket channel.
//!
//! [`DeviceSocketChannel`] owns one byte-stream connection to the device and
//! publishes the lifecycle of its input and output halves. Each half moves
//! through [`StreamState`]:
//!
//! ```text
//! Uninitialized ──► Open ──► Closed        (close())
//!       │             └────► Disconnected  (read/write error, EOF)
//!       └──────────────────► Timeout       (not open within open_timeout)
//! ```
//!
//! Terminal states release the stream handles. A fresh [`open`] is needed
//! to leave them.
//!
//! Decoded inbound frames are published on a broadcast bus. Subscribers only
//! see events received after they subscribed.
//!
//! [`open`]: DeviceSocketChannel::open

use std::fmt;
use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;

use softap_protocol::{MessageCodec, SocketEvent};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::BoxFuture;

/// Default address of the device on its own access point.
pub const DEFAULT_HOST: &str = "192.168.1.1";

/// Default onboarding port.
pub const DEFAULT_PORT: u16 = 50000;

/// How long both halves have to reach `Open`.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Quiet period applied to the merged status stream.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Maximum bytes taken per read; each read is decoded as one frame.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Capacity of the inbound event bus.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of one half of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Uninitialized,
    Open,
    Closed,
    Disconnected,
    Timeout,
}

impl StreamState {
    /// Whether this state can only be left by opening a new socket.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Closed | StreamState::Disconnected | StreamState::Timeout
        )
    }

    /// Whether this state calls for a reconnection attempt.
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, StreamState::Disconnected | StreamState::Timeout)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Uninitialized => "uninitialized",
            StreamState::Open => "open",
            StreamState::Closed => "closed",
            StreamState::Disconnected => "disconnected",
            StreamState::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Host and port of the device socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketTarget {
    pub host: String,
    pub port: u16,
}

impl SocketTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for SocketTarget {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for SocketTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Timing and decoding settings for a [`DeviceSocketChannel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Window for the socket to open before reporting `Timeout`.
    pub open_timeout: Duration,
    /// Quiet period before a status change is published.
    pub debounce: Duration,
    /// Maximum bytes per read.
    pub read_chunk_size: usize,
    /// Codec used on inbound chunks.
    pub codec: MessageCodec,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            debounce: DEFAULT_DEBOUNCE,
            read_chunk_size: READ_CHUNK_SIZE,
            codec: MessageCodec::new(),
        }
    }
}

impl ChannelConfig {
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    pub fn with_codec(mut self, codec: MessageCodec) -> Self {
        self.codec = codec;
        self
    }
}

/// Read half handed out by a [`StreamConnector`].
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half handed out by a [`StreamConnector`].
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Produces the byte streams for a device socket.
pub trait StreamConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        target: &'a SocketTarget,
    ) -> BoxFuture<'a, io::Result<(BoxedReader, BoxedWriter)>>;
}

/// Plain TCP transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl StreamConnector for TcpConnector {
    fn connect<'a>(
        &'a self,
        target: &'a SocketTarget,
    ) -> BoxFuture<'a, io::Result<(BoxedReader, BoxedWriter)>> {
        Box::pin(async move {
            let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
        })
    }
}

// ============================================================================
// Channel
// ============================================================================

/// A single device socket and its inbound event bus.
pub struct DeviceSocketChannel {
    connector: Arc<dyn StreamConnector>,
    config: ChannelConfig,
    inner: Arc<Mutex<ChannelInner>>,
    events: broadcast::Sender<SocketEvent>,
}

struct ChannelInner {
    active: Option<ActiveSocket>,
    next_generation: u64,
    input_state: StreamState,
    output_state: StreamState,
}

/// Handles of the live socket. Dropping this cancels its I/O tasks and
/// ends its status stream.
struct ActiveSocket {
    generation: u64,
    input: watch::Sender<StreamState>,
    output: watch::Sender<StreamState>,
    writer: Option<mpsc::UnboundedSender<Vec<u8>>>,
    _guard: DropGuard,
}

impl ChannelInner {
    fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    fn mark_open(&mut self, generation: u64, writer: mpsc::UnboundedSender<Vec<u8>>) -> bool {
        let Some(active) = self.active.as_mut().filter(|a| a.generation == generation) else {
            return false;
        };
        active.writer = Some(writer);
        active.output.send_replace(StreamState::Open);
        active.input.send_replace(StreamState::Open);
        self.output_state = StreamState::Open;
        self.input_state = StreamState::Open;
        true
    }

    /// Move both halves of `generation` to `state` and release it.
    fn teardown(&mut self, generation: u64, state: StreamState) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        let Some(active) = self.active.take() else {
            return false;
        };
        self.input_state = state;
        self.output_state = state;
        active.input.send_replace(state);
        active.output.send_replace(state);
        true
    }
}

impl DeviceSocketChannel {
    /// Create a closed channel using `connector` for its transport.
    pub fn new(connector: Arc<dyn StreamConnector>, config: ChannelConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connector,
            config,
            inner: Arc::new(Mutex::new(ChannelInner {
                active: None,
                next_generation: 0,
                input_state: StreamState::Uninitialized,
                output_state: StreamState::Uninitialized,
            })),
            events,
        }
    }

    /// Channel over plain TCP.
    pub fn tcp(config: ChannelConfig) -> Self {
        Self::new(Arc::new(TcpConnector), config)
    }

    /// Open the socket to `target`.
    ///
    /// Returns `None` without touching the live socket if one is already
    /// active. Otherwise both halves start `Uninitialized` and the returned
    /// stream reports their merged, debounced, deduplicated state.
    pub async fn open(&self, target: SocketTarget) -> Option<ChannelStatus> {
        let mut inner = self.inner.lock().await;
        if inner.active.is_some() {
            warn!(%target, "Device socket already active, ignoring open");
            return None;
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let (input_tx, input_rx) = watch::channel(StreamState::Uninitialized);
        let (output_tx, output_rx) = watch::channel(StreamState::Uninitialized);
        let token = CancellationToken::new();

        inner.input_state = StreamState::Uninitialized;
        inner.output_state = StreamState::Uninitialized;
        inner.active = Some(ActiveSocket {
            generation,
            input: input_tx,
            output: output_tx,
            writer: None,
            _guard: token.clone().drop_guard(),
        });
        drop(inner);

        let status = ChannelStatus::spawn(input_rx, output_rx, self.config.debounce);
        let task = SocketTask {
            inner: Arc::downgrade(&self.inner),
            generation,
            token,
        };
        tokio::spawn(establish(
            task,
            Arc::clone(&self.connector),
            target,
            self.config.clone(),
            self.events.clone(),
        ));

        Some(status)
    }

    /// Release the socket and report `Closed` on both halves.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(generation) = inner.active.as_ref().map(|a| a.generation) {
            inner.teardown(generation, StreamState::Closed);
            info!("Device socket closed");
        }
    }

    /// Queue a frame for writing.
    ///
    /// Returns `false`, and writes nothing, unless the output half is open.
    pub async fn send(&self, frame: Vec<u8>) -> bool {
        let inner = self.inner.lock().await;
        if inner.output_state != StreamState::Open {
            warn!(state = %inner.output_state, "Output stream not open, dropping write");
            return false;
        }
        match inner.active.as_ref().and_then(|a| a.writer.as_ref()) {
            Some(writer) => writer.send(frame).is_ok(),
            None => false,
        }
    }

    /// Last known state of the output half.
    pub async fn output_state(&self) -> StreamState {
        self.inner.lock().await.output_state
    }

    /// Last known state of the input half.
    pub async fn input_state(&self) -> StreamState {
        self.inner.lock().await.input_state
    }

    /// Whether a socket is currently held.
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.active.is_some()
    }

    /// Subscribe to decoded inbound events.
    pub fn events(&self) -> broadcast::Receiver<SocketEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

/// What a background socket task needs to find its way back to the channel.
#[derive(Clone)]
struct SocketTask {
    inner: Weak<Mutex<ChannelInner>>,
    generation: u64,
    token: CancellationToken,
}

impl SocketTask {
    async fn teardown(&self, state: StreamState) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.lock().await.teardown(self.generation, state) {
            debug!(generation = self.generation, state = %state, "Device socket released");
        }
    }
}

async fn establish(
    task: SocketTask,
    connector: Arc<dyn StreamConnector>,
    target: SocketTarget,
    config: ChannelConfig,
    events: broadcast::Sender<SocketEvent>,
) {
    debug!(%target, generation = task.generation, "Opening device socket");

    let connect = tokio::time::timeout(config.open_timeout, connector.connect(&target));
    let result = tokio::select! {
        _ = task.token.cancelled() => return,
        result = connect => result,
    };

    let (reader, writer) = match result {
        Ok(Ok(streams)) => streams,
        Ok(Err(e)) => {
            warn!(%target, error = %e, "Device socket failed to open");
            task.teardown(StreamState::Disconnected).await;
            return;
        }
        Err(_) => {
            warn!(%target, timeout = ?config.open_timeout, "Device socket did not open in time");
            task.teardown(StreamState::Timeout).await;
            return;
        }
    };

    let (write_tx, write_rx) = mpsc::unbounded_channel();
    {
        let Some(inner) = task.inner.upgrade() else {
            return;
        };
        if !inner.lock().await.mark_open(task.generation, write_tx) {
            return;
        }
    }
    info!(%target, "Device socket open");

    tokio::spawn(write_loop(task.clone(), writer, write_rx));
    read_loop(task, reader, config.codec, config.read_chunk_size, events).await;
}

async fn read_loop(
    task: SocketTask,
    mut reader: BoxedReader,
    codec: MessageCodec,
    chunk_size: usize,
    events: broadcast::Sender<SocketEvent>,
) {
    let mut buf = vec![0u8; chunk_size.max(1)];

    let state = loop {
        let read = tokio::select! {
            _ = task.token.cancelled() => return,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                info!("Device closed the socket");
                break StreamState::Disconnected;
            }
            Ok(n) => match codec.decode(&buf[..n]) {
                Ok(event) => {
                    debug!(op_type = %event.kind, status = ?event.status, "Received device event");
                    // No subscribers is fine; events are not buffered for latecomers
                    let _ = events.send(event);
                }
                Err(e) => warn!(error = %e, bytes = n, "Dropping undecodable frame"),
            },
            Err(e) => {
                warn!(error = %e, "Device socket read failed");
                break StreamState::Disconnected;
            }
        }
    };

    task.teardown(state).await;
}

async fn write_loop(
    task: SocketTask,
    mut writer: BoxedWriter,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    loop {
        let frame = tokio::select! {
            _ = task.token.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let written: io::Result<()> = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!(error = %e, "Device socket write failed");
            task.teardown(StreamState::Disconnected).await;
            return;
        }
    }

    let _ = writer.shutdown().await;
}

// ============================================================================
// Status stream
// ============================================================================

/// Merged status of both socket halves.
///
/// Values are debounced and never repeat consecutively. The stream ends
/// once the socket has been released and its final state delivered.
pub struct ChannelStatus {
    states: mpsc::UnboundedReceiver<StreamState>,
}

impl ChannelStatus {
    /// Wrap an already merged and deduplicated state stream.
    pub fn new(states: mpsc::UnboundedReceiver<StreamState>) -> Self {
        Self { states }
    }

    fn spawn(
        input: watch::Receiver<StreamState>,
        output: watch::Receiver<StreamState>,
        debounce: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(merge_states(input, output, debounce, tx));
        Self { states: rx }
    }

    /// Next distinct state, or `None` once the socket is gone.
    pub async fn next(&mut self) -> Option<StreamState> {
        self.states.recv().await
    }
}

impl fmt::Debug for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelStatus").finish_non_exhaustive()
    }
}

async fn merge_states(
    mut input: watch::Receiver<StreamState>,
    mut output: watch::Receiver<StreamState>,
    debounce: Duration,
    tx: mpsc::UnboundedSender<StreamState>,
) {
    input.borrow_and_update();
    let mut pending = Some(*output.borrow_and_update());
    let mut deadline = Instant::now() + debounce;
    let mut last = None;
    let (mut input_live, mut output_live) = (true, true);

    loop {
        if !input_live && !output_live {
            // Both halves released: flush without waiting out the debounce
            if let Some(state) = pending.take() {
                emit(&tx, &mut last, state);
            }
            return;
        }

        tokio::select! {
            _ = tx.closed() => return,
            changed = input.changed(), if input_live => match changed {
                Ok(()) => {
                    pending = Some(*input.borrow_and_update());
                    deadline = Instant::now() + debounce;
                }
                Err(_) => input_live = false,
            },
            changed = output.changed(), if output_live => match changed {
                Ok(()) => {
                    pending = Some(*output.borrow_and_update());
                    deadline = Instant::now() + debounce;
                }
                Err(_) => output_live = false,
            },
            _ = sleep_until(deadline), if pending.is_some() => {
                if let Some(state) = pending.take() {
                    if !emit(&tx, &mut last, state) {
                        return;
                    }
                }
            }
        }
    }
}

fn emit(
    tx: &mpsc::UnboundedSender<StreamState>,
    last: &mut Option<StreamState>,
    state: StreamState,
) -> bool {
    if *last == Some(state) {
        return true;
    }
    *last = Some(state);
    tx.send(state).is_ok()
}
