//! Connection session with a single connect attempt and a blocking-style
//! read loop

use crate::config::SessionConfig;
use crate::transport::{ConnectStrategy, DeviceAdapter, DeviceTarget, PairedDevice, TransportStream};
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vitals_shared::{
    telemetry, ConnectionState, ConnectionStateMachine, FrameAssembler, LinkError,
    SessionTrigger, TelemetryReading, TransitionResult,
};

pub const STATUS_CONNECTING: &str = "Connecting...";
pub const STATUS_CONNECTED: &str = "Connected";
pub const STATUS_LOST: &str = "Connection lost";
pub const STATUS_ERROR: &str = "Error";

/// Events emitted by the session, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Short status text for the consumer
    StatusChanged(String),
    /// Transport handshake succeeded, the read loop is running
    Connected,
    /// The link dropped while the session was running
    Disconnected { reason: String },
    /// One line carried at least one recognized field
    TelemetryUpdate(TelemetryReading),
    /// Discovery or connection failed; the session is finished
    Failed(LinkError),
}

/// A single-use link session
///
/// `start` runs discovery and the connection handshake on a background task.
/// On success that task hands the stream to a second task running the read
/// loop. Events are delivered through [`ConnectionSession::recv`], which
/// returns `None` once both tasks have finished.
pub struct ConnectionSession {
    config: SessionConfig,
    adapter: Arc<dyn DeviceAdapter>,
    strategies: Arc<Vec<Box<dyn ConnectStrategy>>>,
    fsm: Arc<RwLock<ConnectionStateMachine>>,
    /// Set while the read loop is meant to run, cleared by `stop`
    running: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    event_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    connect_task: Option<JoinHandle<()>>,
    reader_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionSession {
    /// Create a session; nothing happens until [`ConnectionSession::start`]
    pub fn new(
        config: SessionConfig,
        adapter: Arc<dyn DeviceAdapter>,
        strategies: Vec<Box<dyn ConnectStrategy>>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, _) = watch::channel(false);

        Self {
            config,
            adapter,
            strategies: Arc::new(strategies),
            fsm: Arc::new(RwLock::new(ConnectionStateMachine::new())),
            running: Arc::new(AtomicBool::new(false)),
            stop_tx,
            event_tx: Some(event_tx),
            event_rx,
            connect_task: None,
            reader_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Begin discovery and connection in the background
    pub async fn start(&mut self) -> Result<()> {
        if *self.stop_tx.borrow() {
            return Err(anyhow!("session was stopped"));
        }

        if let TransitionResult::Invalid { from, .. } =
            self.fsm.write().await.process_event(SessionTrigger::Start)
        {
            return Err(anyhow!("session cannot start from {} state", from));
        }

        let event_tx = self
            .event_tx
            .take()
            .ok_or_else(|| anyhow!("session already started"))?;

        info!(
            "[SESSION] Looking for '{}' among paired devices",
            self.config.device_name
        );
        let _ = event_tx.send(SessionEvent::StatusChanged(STATUS_CONNECTING.into()));

        let task = ConnectTask {
            target: self.config.target(),
            read_chunk_size: self.config.read_chunk_size.max(1),
            max_line_bytes: self.config.max_line_bytes,
            adapter: self.adapter.clone(),
            strategies: self.strategies.clone(),
            fsm: self.fsm.clone(),
            running: self.running.clone(),
            stop_rx: self.stop_tx.subscribe(),
            event_tx,
            reader_slot: self.reader_task.clone(),
        };
        self.connect_task = Some(tokio::spawn(task.run()));

        Ok(())
    }

    /// Stop the session and close the transport
    ///
    /// Waits for the background tasks to finish. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if self.stop_tx.send_replace(true) {
            debug!("[SESSION] Already stopped");
            return;
        }

        info!("[SESSION] Stopping");
        let _ = self.fsm.write().await.process_event(SessionTrigger::Stop);
        self.running.store(false, Ordering::Release);

        if let Some(task) = self.connect_task.take() {
            let _ = task.await;
        }
        let reader = self.reader_task.lock().await.take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }
        // Never started: close the channel so `recv` ends
        self.event_tx = None;
    }

    /// Receive the next session event
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ConnectionState {
        self.fsm.read().await.state()
    }

    /// Whether the read loop is meant to be running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Resolves once stop is requested or the session handle is gone
async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *stop_rx.borrow_and_update();
        if stopped {
            return;
        }
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Try each strategy in order until one yields a stream
///
/// A permission error ends the attempt at once. When every strategy fails
/// the first failure is reported.
pub async fn connect_with_strategies(
    device: &PairedDevice,
    strategies: &[Box<dyn ConnectStrategy>],
) -> Result<Box<dyn TransportStream>, LinkError> {
    let mut first_error: Option<LinkError> = None;

    for strategy in strategies {
        info!("[LINK] Trying {} for {}", strategy.name(), device.address);
        match strategy.connect(device).await {
            Ok(stream) => return Ok(stream),
            Err(err) if err.is_permission() => {
                warn!("[LINK] {} was denied permission", strategy.name());
                return Err(err);
            }
            Err(err) => {
                warn!("[LINK] {} failed: {}", strategy.name(), err);
                first_error.get_or_insert(err);
            }
        }
    }

    Err(match first_error {
        Some(LinkError::ConnectFailed(message)) => LinkError::ConnectFailed(message),
        Some(other) => LinkError::ConnectFailed(other.to_string()),
        None => LinkError::ConnectFailed("no connection strategy configured".into()),
    })
}

/// Discovery followed by the strategy list
async fn establish(
    target: &DeviceTarget,
    adapter: &dyn DeviceAdapter,
    strategies: &[Box<dyn ConnectStrategy>],
) -> Result<(PairedDevice, Box<dyn TransportStream>), LinkError> {
    if !adapter.is_powered().await? {
        return Err(LinkError::AdapterDisabled);
    }

    let devices = match adapter.paired_devices().await {
        Ok(devices) => devices,
        Err(err) => {
            warn!("[SESSION] Could not list paired devices: {}", err);
            Vec::new()
        }
    };

    let device = target.find(&devices).cloned().ok_or(LinkError::DeviceNotFound)?;
    debug!("[SESSION] Selected {:?} at {}", device.name, device.address);

    let stream = connect_with_strategies(&device, strategies).await?;
    Ok((device, stream))
}

/// State moved into the connecting task
struct ConnectTask {
    target: DeviceTarget,
    read_chunk_size: usize,
    max_line_bytes: Option<usize>,
    adapter: Arc<dyn DeviceAdapter>,
    strategies: Arc<Vec<Box<dyn ConnectStrategy>>>,
    fsm: Arc<RwLock<ConnectionStateMachine>>,
    running: Arc<AtomicBool>,
    stop_rx: watch::Receiver<bool>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    reader_slot: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectTask {
    async fn run(mut self) {
        let outcome = tokio::select! {
            _ = wait_for_stop(&mut self.stop_rx) => {
                debug!("[SESSION] Stopped while connecting");
                return;
            }
            outcome = establish(&self.target, self.adapter.as_ref(), &self.strategies) => outcome,
        };

        match outcome {
            Ok((device, mut stream)) => {
                {
                    // Decided under the lock so a concurrent stop wins cleanly
                    let mut fsm = self.fsm.write().await;
                    if let TransitionResult::Invalid { from, .. } =
                        fsm.process_event(SessionTrigger::Established)
                    {
                        debug!("[SESSION] Handshake finished in {} state, closing", from);
                        drop(fsm);
                        let _ = stream.shutdown().await;
                        return;
                    }
                    self.running.store(true, Ordering::Release);
                }

                info!(
                    "[SESSION] Connected to {} ({})",
                    device.name.as_deref().unwrap_or("unnamed"),
                    device.address
                );
                let _ = self
                    .event_tx
                    .send(SessionEvent::StatusChanged(STATUS_CONNECTED.into()));
                let _ = self.event_tx.send(SessionEvent::Connected);

                let assembler = match self.max_line_bytes {
                    Some(limit) => FrameAssembler::with_limit(limit),
                    None => FrameAssembler::new(),
                };
                let reader = ReadLoop {
                    stream,
                    assembler,
                    read_chunk_size: self.read_chunk_size,
                    fsm: self.fsm.clone(),
                    running: self.running.clone(),
                    stop_rx: self.stop_rx.clone(),
                    event_tx: self.event_tx.clone(),
                };
                *self.reader_slot.lock().await = Some(tokio::spawn(reader.run()));
            }
            Err(err) => {
                let result = self.fsm.write().await.process_event(SessionTrigger::ConnectFailed);
                if matches!(result, TransitionResult::Invalid { .. }) {
                    debug!("[SESSION] Ignoring failure after stop: {}", err);
                    return;
                }

                error!("[SESSION] Connection failed: {}", err);
                let _ = self
                    .event_tx
                    .send(SessionEvent::StatusChanged(STATUS_ERROR.into()));
                let _ = self.event_tx.send(SessionEvent::Failed(err));
            }
        }
    }
}

/// State moved into the reading task
struct ReadLoop {
    stream: Box<dyn TransportStream>,
    assembler: FrameAssembler,
    read_chunk_size: usize,
    fsm: Arc<RwLock<ConnectionStateMachine>>,
    running: Arc<AtomicBool>,
    stop_rx: watch::Receiver<bool>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ReadLoop {
    async fn run(mut self) {
        let mut read_buf = vec![0u8; self.read_chunk_size];

        while self.running.load(Ordering::Acquire) {
            let result = tokio::select! {
                biased;
                _ = wait_for_stop(&mut self.stop_rx) => break,
                result = self.stream.read(&mut read_buf) => result,
            };

            let lost = match result {
                Ok(0) => Some("connection closed by peer".to_string()),
                Ok(n) => {
                    self.dispatch(&read_buf[..n]);
                    None
                }
                Err(e) => Some(LinkError::Read(e.to_string()).to_string()),
            };

            if let Some(reason) = lost {
                self.connection_lost(reason).await;
                break;
            }
        }

        if let Err(e) = self.stream.shutdown().await {
            debug!("[SESSION] Transport close: {}", e);
        }
        debug!("[SESSION] Read loop finished");
    }

    /// Frame the chunk and forward every non-empty reading
    fn dispatch(&mut self, chunk: &[u8]) {
        let overflows = self.assembler.overflow_count();

        for line in self.assembler.feed(chunk) {
            if line.is_empty() {
                continue;
            }
            let reading = telemetry::parse(&line);
            if reading.is_empty() {
                debug!("[SESSION] No vitals in line: {}", line);
                continue;
            }
            let _ = self.event_tx.send(SessionEvent::TelemetryUpdate(reading));
        }

        if self.assembler.overflow_count() > overflows {
            warn!("[SESSION] Discarded an unterminated line over the size limit");
        }
    }

    async fn connection_lost(&mut self, reason: String) {
        let mut fsm = self.fsm.write().await;
        // Read under the lock so a concurrent stop is either fully before or after
        let stop_requested = *self.stop_rx.borrow();
        let result = fsm.process_event(SessionTrigger::ConnectionLost);
        drop(fsm);
        self.running.store(false, Ordering::Release);

        if stop_requested || matches!(result, TransitionResult::Invalid { .. }) {
            // Stop already closed the session
            debug!("[SESSION] Read ended after stop: {}", reason);
            return;
        }

        warn!("[SESSION] Connection lost: {}", reason);
        let _ = self.event_tx.send(SessionEvent::StatusChanged(STATUS_LOST.into()));
        let _ = self.event_tx.send(SessionEvent::Disconnected { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::AtomicUsize;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

    #[async_trait]
    impl TransportStream for DuplexStream {
        async fn shutdown(&mut self) -> anyhow::Result<()> {
            AsyncWriteExt::shutdown(self).await?;
            Ok(())
        }
    }

    /// Stream whose reads always fail
    struct BrokenStream;

    impl AsyncRead for BrokenStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "link reset")))
        }
    }

    impl AsyncWrite for BrokenStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[async_trait]
    impl TransportStream for BrokenStream {
        async fn shutdown(&mut self) -> anyhow::Result<()> {
            Err(anyhow!("already broken"))
        }
    }

    struct FakeAdapter {
        powered: Result<bool, LinkError>,
        devices: Vec<PairedDevice>,
    }

    impl FakeAdapter {
        fn with_hc05() -> Self {
            Self {
                powered: Ok(true),
                devices: vec![
                    PairedDevice::new(Some("Headphones"), "AA:AA:AA:AA:AA:AA"),
                    PairedDevice::new(Some("hc-05"), "98:D3:31:F5:0A:1B"),
                ],
            }
        }
    }

    #[async_trait]
    impl DeviceAdapter for FakeAdapter {
        async fn is_powered(&self) -> Result<bool, LinkError> {
            self.powered.clone()
        }

        async fn paired_devices(&self) -> Result<Vec<PairedDevice>, LinkError> {
            Ok(self.devices.clone())
        }
    }

    /// Strategy returning a prepared outcome once
    struct ScriptedStrategy {
        outcome: std::sync::Mutex<Option<Result<Box<dyn TransportStream>, LinkError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedStrategy {
        fn new(
            outcome: Result<Box<dyn TransportStream>, LinkError>,
        ) -> (Box<dyn ConnectStrategy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Self {
                outcome: std::sync::Mutex::new(Some(outcome)),
                calls: calls.clone(),
            };
            (Box::new(strategy), calls)
        }
    }

    #[async_trait]
    impl ConnectStrategy for ScriptedStrategy {
        async fn connect(
            &self,
            _device: &PairedDevice,
        ) -> Result<Box<dyn TransportStream>, LinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(LinkError::ConnectFailed("already used".into())))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn session_with(
        adapter: FakeAdapter,
        strategies: Vec<Box<dyn ConnectStrategy>>,
    ) -> ConnectionSession {
        ConnectionSession::new(SessionConfig::default(), Arc::new(adapter), strategies)
    }

    /// Drain events until the session's tasks are done
    async fn drain(session: &mut ConnectionSession) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(5), session.recv()).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return events,
                Err(_) => panic!("session did not finish, got {:?}", events),
            }
        }
    }

    /// Receive events until `Connected`
    async fn until_connected(session: &mut ConnectionSession) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), session.recv())
                .await
                .expect("timed out waiting for Connected")
                .expect("session ended before connecting");
            if event == SessionEvent::Connected {
                return;
            }
        }
    }

    fn status(text: &str) -> SessionEvent {
        SessionEvent::StatusChanged(text.into())
    }

    fn failure_events(err: LinkError) -> Vec<SessionEvent> {
        vec![status(STATUS_CONNECTING), status(STATUS_ERROR), SessionEvent::Failed(err)]
    }

    #[tokio::test]
    async fn test_read_error_after_stop_is_silent() {
        let mut fsm = ConnectionStateMachine::new();
        fsm.process_event(SessionTrigger::Start);
        fsm.process_event(SessionTrigger::Established);
        let fsm = Arc::new(RwLock::new(fsm));

        let (_stop_tx, stop_rx) = watch::channel(true);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut reader = ReadLoop {
            stream: Box::new(BrokenStream),
            assembler: FrameAssembler::new(),
            read_chunk_size: 64,
            fsm: fsm.clone(),
            running: Arc::new(AtomicBool::new(true)),
            stop_rx,
            event_tx,
        };

        reader.connection_lost("link reset".into()).await;
        let running = reader.running.clone();
        drop(reader);

        assert_eq!(event_rx.recv().await, None);
        assert!(!running.load(Ordering::Acquire));
        assert_eq!(fsm.read().await.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_device_not_found() {
        let adapter = FakeAdapter {
            powered: Ok(true),
            devices: vec![PairedDevice::new(Some("Headphones"), "AA:AA:AA:AA:AA:AA")],
        };
        let (strategy, calls) =
            ScriptedStrategy::new(Err(LinkError::ConnectFailed("unused".into())));
        let mut session = session_with(adapter, vec![strategy]);

        session.start().await.unwrap();
        let events = drain(&mut session).await;

        assert_eq!(events, failure_events(LinkError::DeviceNotFound));
        assert_eq!(session.state().await, ConnectionState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_adapter_disabled_and_missing() {
        let adapter = FakeAdapter {
            powered: Ok(false),
            ..FakeAdapter::with_hc05()
        };
        let mut session = session_with(adapter, Vec::new());
        session.start().await.unwrap();
        assert_eq!(drain(&mut session).await, failure_events(LinkError::AdapterDisabled));

        let adapter = FakeAdapter {
            powered: Err(LinkError::AdapterUnavailable),
            ..FakeAdapter::with_hc05()
        };
        let mut session = session_with(adapter, Vec::new());
        session.start().await.unwrap();
        assert_eq!(drain(&mut session).await, failure_events(LinkError::AdapterUnavailable));
    }

    #[tokio::test]
    async fn test_fallback_after_connect_failure() {
        let (device_end, mut sensor_end) = tokio::io::duplex(256);
        let (primary, primary_calls) =
            ScriptedStrategy::new(Err(LinkError::ConnectFailed("service discovery failed".into())));
        let (fallback, fallback_calls) = ScriptedStrategy::new(Ok(Box::new(device_end)));
        let mut session = session_with(FakeAdapter::with_hc05(), vec![primary, fallback]);

        session.start().await.unwrap();
        until_connected(&mut session).await;
        assert_eq!(session.state().await, ConnectionState::Connected);
        assert!(session.is_running());
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);

        sensor_end.write_all(b"HR:66\n").await.unwrap();
        let event = session.recv().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::TelemetryUpdate(telemetry::parse("HR:66"))
        );

        session.stop().await;
    }

    #[tokio::test]
    async fn test_permission_denied_skips_fallback() {
        let (device_end, _sensor_end) = tokio::io::duplex(64);
        let (primary, _) = ScriptedStrategy::new(Err(LinkError::PermissionDenied));
        let (fallback, fallback_calls) = ScriptedStrategy::new(Ok(Box::new(device_end)));
        let mut session = session_with(FakeAdapter::with_hc05(), vec![primary, fallback]);

        session.start().await.unwrap();
        assert_eq!(drain(&mut session).await, failure_events(LinkError::PermissionDenied));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_strategies_fail_reports_first_error() {
        let first = LinkError::ConnectFailed("read failed, socket might closed".into());
        let (primary, _) = ScriptedStrategy::new(Err(first.clone()));
        let (fallback, _) =
            ScriptedStrategy::new(Err(LinkError::ConnectFailed("host is down".into())));
        let mut session = session_with(FakeAdapter::with_hc05(), vec![primary, fallback]);

        session.start().await.unwrap();
        assert_eq!(drain(&mut session).await, failure_events(first));
    }

    #[tokio::test]
    async fn test_fallback_permission_denied() {
        let (primary, _) = ScriptedStrategy::new(Err(LinkError::ConnectFailed("timeout".into())));
        let (fallback, _) = ScriptedStrategy::new(Err(LinkError::PermissionDenied));
        let devices = [PairedDevice::new(Some("HC-05"), "98:D3:31:F5:0A:1B")];

        let result = connect_with_strategies(&devices[0], &[primary, fallback]).await;
        assert!(matches!(result, Err(LinkError::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_match_by_configured_address() {
        let (device_end, _sensor_end) = tokio::io::duplex(64);
        let adapter = FakeAdapter {
            powered: Ok(true),
            devices: vec![PairedDevice::new(Some("Renamed module"), "98:D3:31:F5:0A:1B")],
        };
        let (strategy, _) = ScriptedStrategy::new(Ok(Box::new(device_end)));
        let config = SessionConfig {
            device_address: Some("98:D3:31:F5:0A:1B".into()),
            ..Default::default()
        };
        let mut session = ConnectionSession::new(config, Arc::new(adapter), vec![strategy]);

        session.start().await.unwrap();
        until_connected(&mut session).await;
        session.stop().await;
    }

    #[tokio::test]
    async fn test_telemetry_flow_then_peer_close() {
        let (device_end, mut sensor_end) = tokio::io::duplex(256);
        let (strategy, _) = ScriptedStrategy::new(Ok(Box::new(device_end)));
        let mut session = session_with(FakeAdapter::with_hc05(), vec![strategy]);

        session.start().await.unwrap();
        sensor_end
            .write_all(b"HR:72,SPO2:98\r\nFOO:1\nTEMP:36")
            .await
            .unwrap();
        sensor_end.write_all(b".6\n").await.unwrap();
        drop(sensor_end);

        let events = drain(&mut session).await;
        assert_eq!(
            events,
            vec![
                status(STATUS_CONNECTING),
                status(STATUS_CONNECTED),
                SessionEvent::Connected,
                SessionEvent::TelemetryUpdate(telemetry::parse("HR:72,SPO2:98")),
                SessionEvent::TelemetryUpdate(telemetry::parse("TEMP:36.6")),
                status(STATUS_LOST),
                SessionEvent::Disconnected {
                    reason: "connection closed by peer".into()
                },
            ]
        );
        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_read_error_disconnects_once() {
        let (strategy, _) = ScriptedStrategy::new(Ok(Box::new(BrokenStream)));
        let mut session = session_with(FakeAdapter::with_hc05(), vec![strategy]);

        session.start().await.unwrap();
        let events = drain(&mut session).await;

        let disconnects: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Disconnected { .. }))
            .collect();
        assert_eq!(disconnects.len(), 1);
        assert!(matches!(
            disconnects[0],
            SessionEvent::Disconnected { reason } if reason.contains("link reset")
        ));
        assert_eq!(events.last(), disconnects.last().copied());

        // Channel closed: the loop is gone, not spinning
        assert!(session.recv().await.is_none());
        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_twice_while_reading() {
        let (device_end, _sensor_end) = tokio::io::duplex(64);
        let (strategy, _) = ScriptedStrategy::new(Ok(Box::new(device_end)));
        let mut session = session_with(FakeAdapter::with_hc05(), vec![strategy]);

        session.start().await.unwrap();
        until_connected(&mut session).await;

        // The read is blocked: nothing is ever written by the sensor end
        session.stop().await;
        session.stop().await;

        assert!(!session.is_running());
        assert_eq!(session.state().await, ConnectionState::Disconnected);
        assert!(drain(&mut session).await.is_empty());
    }

    #[tokio::test]
    async fn test_session_is_single_use() {
        let mut session = session_with(FakeAdapter::with_hc05(), Vec::new());
        session.start().await.unwrap();
        assert!(session.start().await.is_err());
        drain(&mut session).await;

        let mut stopped = session_with(FakeAdapter::with_hc05(), Vec::new());
        stopped.stop().await;
        assert!(stopped.start().await.is_err());
        assert!(stopped.recv().await.is_none());
    }
}
