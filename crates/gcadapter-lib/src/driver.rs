//! Adapter driver: scan/lifecycle state machine, I/O threads and the
//! per-frame polling API.
//!
//! One [`Adapter`] owns at most one open device session at a time. A
//! scan thread discovers and claims the device, a read thread streams
//! input payloads into a shared buffer, and a write thread flushes
//! staged rumble commands. The public API never blocks on USB; it only
//! takes short-lived locks over small fixed-size buffers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{ConfigStore, PortsConfig, SiDeviceKind, SubscriptionHandle};
use crate::error::ClaimError;
use crate::protocol::{
    decode_record, payload_valid, port_record, record_type, rumble_payload, ControllerType,
    PadState, ERR_STATUS, GET_ORIGIN, INIT_PAYLOAD, INPUT_PAYLOAD_SIZE, PORT_COUNT,
    RUMBLE_PAYLOAD_SIZE, TRANSFER_TIMEOUT_MS,
};
use crate::scan::{InitLimiter, SCAN_INTERVAL};
use crate::sync::Event;
use crate::transport::{AdapterIo, HotplugEvent, Transport};

const TRANSFER_TIMEOUT: Duration = Duration::from_millis(TRANSFER_TIMEOUT_MS);

// ── Status ──

/// Detection state, owned by the scan thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterStatus {
    /// No adapter on the bus (or none claimed yet).
    NotDetected,
    /// Session open, I/O threads running.
    Detected,
    /// A matching device exists but could not be claimed.
    Error(ClaimError),
}

type StatusCallback = Arc<dyn Fn() + Send + Sync>;

// ── Options ──

/// Behavior switches fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterOptions {
    /// In strict (determinism-enforcing) mode, an empty port is
    /// reported as plain neutral input instead of carrying the
    /// desync-detection error flag.
    pub strict_determinism: bool,
}

// ── Shared state ──

/// Latest raw input transfer. Written whole under lock so readers
/// never observe a torn payload.
struct InputBuffer {
    payload: [u8; INPUT_PAYLOAD_SIZE],
    size: usize,
}

impl InputBuffer {
    const fn new() -> Self {
        InputBuffer {
            payload: [0; INPUT_PAYLOAD_SIZE],
            size: 0,
        }
    }
}

/// An open device plus its two I/O threads. The thread lifetimes are
/// strictly nested inside the session's: spawned after claim, joined
/// before the handle is dropped.
struct SessionState {
    io: Arc<dyn AdapterIo>,
    read_thread: Option<JoinHandle<()>>,
    write_thread: Option<JoinHandle<()>>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    options: AdapterOptions,

    /// Lifecycle lock: session open/close is single-writer. Also the
    /// guard `reset_rumble` probes to avoid racing a teardown.
    session: Mutex<Option<SessionState>>,
    status: Mutex<AdapterStatus>,
    status_callback: Mutex<Option<StatusCallback>>,

    input: Mutex<InputBuffer>,
    rumble: Mutex<[u8; PORT_COUNT]>,
    rumble_ready: Event,
    controller_types: Mutex<[ControllerType; PORT_COUNT]>,
    config: Mutex<PortsConfig>,

    /// Run flag for the read and write threads.
    io_running: AtomicBool,
    /// Run flag for the scan thread.
    scan_running: AtomicBool,
    /// Set by an I/O thread that observed the device leaving; consumed
    /// by the scan loop, which performs the actual reset.
    pending_disconnect: AtomicBool,
}

impl Shared {
    // ── Scan thread ──
    //
    // Session setup clones the shared handle into new threads, so the
    // lifecycle functions take an explicit `&Arc<Shared>`.

    fn scan_loop(this: &Arc<Shared>) {
        log::info!("adapter scan thread started");
        while this.scan_running.load(Ordering::SeqCst) {
            if this.pending_disconnect.swap(false, Ordering::SeqCst) && !Shared::reset(this) {
                // Lost the lifecycle lock (e.g. to reset_rumble); keep
                // the disconnect pending so the next pass retries.
                this.pending_disconnect.store(true, Ordering::SeqCst);
            }
            if this.session.lock().unwrap().is_none() {
                Shared::try_setup(this);
            }
            for event in this.transport.wait_events(SCAN_INTERVAL) {
                match event {
                    // Claimed on the next pass through the loop.
                    HotplugEvent::Arrived => {}
                    HotplugEvent::Left(id) => {
                        let open = this.session.lock().unwrap().as_ref().map(|s| s.io.id());
                        if open == Some(id) && !Shared::reset(this) {
                            this.pending_disconnect.store(true, Ordering::SeqCst);
                        }
                    }
                }
            }
        }
        log::info!("adapter scan thread stopped");
    }

    fn try_setup(this: &Arc<Shared>) {
        match this.transport.open_adapter() {
            Ok(io) => Shared::start_session(this, Arc::from(io)),
            // Quiet pass: nothing plugged in. Also clears a stale
            // error status once the offending device is gone.
            Err(ClaimError::NotFound) => this.set_status(AdapterStatus::NotDetected),
            Err(e) => {
                log::warn!("adapter claim failed: {e}");
                this.set_status(AdapterStatus::Error(e));
            }
        }
    }

    fn start_session(this: &Arc<Shared>, io: Arc<dyn AdapterIo>) {
        let mut session = this.session.lock().unwrap();
        if session.is_some() {
            return;
        }

        // Switch the adapter into streaming mode before any thread
        // touches it; guarantees init precedes every rumble payload.
        if let Err(e) = io.write_interrupt(&INIT_PAYLOAD, TRANSFER_TIMEOUT) {
            log::warn!("adapter init payload failed: {e}");
            if e.is_disconnect() {
                return;
            }
        }

        *this.rumble.lock().unwrap() = [0; PORT_COUNT];
        this.rumble_ready.reset();

        // Silence any rumble a previous session left running on the
        // adapter; the staged array alone cannot, since a zero command
        // is never flushed until something stages a change.
        if let Err(e) = io.write_interrupt(&rumble_payload(&[0; PORT_COUNT]), TRANSFER_TIMEOUT) {
            log::warn!("rumble reset write: {e}");
        }

        this.io_running.store(true, Ordering::SeqCst);

        let read_thread = {
            let shared = Arc::clone(this);
            let io = Arc::clone(&io);
            thread::Builder::new()
                .name("gcadapter read".into())
                .spawn(move || shared.read_loop(io))
        };
        let read_thread = match read_thread {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("failed to spawn read thread: {e}");
                this.io_running.store(false, Ordering::SeqCst);
                return;
            }
        };

        let write_thread = {
            let shared = Arc::clone(this);
            let io = Arc::clone(&io);
            thread::Builder::new()
                .name("gcadapter write".into())
                .spawn(move || shared.write_loop(io))
        };
        let write_thread = match write_thread {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("failed to spawn write thread: {e}");
                this.io_running.store(false, Ordering::SeqCst);
                let _ = read_thread.join();
                return;
            }
        };

        *session = Some(SessionState {
            io,
            read_thread: Some(read_thread),
            write_thread: Some(write_thread),
        });
        drop(session);
        this.set_status(AdapterStatus::Detected);
    }

    /// Tear down the open session, if any: stop and join both I/O
    /// threads, drop the handle, clear per-port state. Safe to call
    /// with no session open. Returns false without touching anything
    /// if another setup/teardown holds the lifecycle lock, so callers
    /// can retry.
    fn reset(this: &Arc<Shared>) -> bool {
        let mut session = match this.session.try_lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        if let Some(mut active) = session.take() {
            this.io_running.store(false, Ordering::SeqCst);
            // Signal before join: the write thread blocks on this.
            this.rumble_ready.set();
            if let Some(handle) = active.read_thread.take() {
                let _ = handle.join();
            }
            if let Some(handle) = active.write_thread.take() {
                let _ = handle.join();
            }
            // Handle dropped here; interface released.
        }
        drop(session);

        *this.controller_types.lock().unwrap() = [ControllerType::None; PORT_COUNT];
        *this.input.lock().unwrap() = InputBuffer::new();
        this.rumble_ready.reset();
        this.set_status(AdapterStatus::NotDetected);
        true
    }

    // ── I/O threads ──

    fn read_loop(&self, io: Arc<dyn AdapterIo>) {
        let mut scratch = [0u8; INPUT_PAYLOAD_SIZE];
        while self.io_running.load(Ordering::SeqCst) {
            match io.read_interrupt(&mut scratch, TRANSFER_TIMEOUT) {
                Ok(size) => {
                    let mut input = self.input.lock().unwrap();
                    input.payload = scratch;
                    input.size = size;
                }
                Err(e) if e.is_disconnect() => {
                    log::info!("adapter read: {e}");
                    self.pending_disconnect.store(true, Ordering::SeqCst);
                    self.transport.wake();
                    break;
                }
                // Timeouts are normal cadence on a quiet bus.
                Err(crate::error::TransferError::Timeout) => {}
                Err(e) => log::warn!("adapter read: {e}"),
            }
            thread::yield_now();
        }
    }

    fn write_loop(&self, io: Arc<dyn AdapterIo>) {
        loop {
            self.rumble_ready.wait();
            if !self.io_running.load(Ordering::SeqCst) {
                break;
            }
            // Latest staged commands only; intermediate values may be
            // coalesced away, which is the intended semantics.
            let payload = rumble_payload(&self.rumble.lock().unwrap());
            match io.write_interrupt(&payload, TRANSFER_TIMEOUT) {
                Ok(RUMBLE_PAYLOAD_SIZE) => {}
                Ok(size) => log::warn!("short rumble write: {size} bytes"),
                Err(e) if e.is_disconnect() => {
                    log::info!("adapter write: {e}");
                    self.pending_disconnect.store(true, Ordering::SeqCst);
                    self.transport.wake();
                    break;
                }
                Err(e) => log::warn!("adapter write: {e}"),
            }
        }
    }

    // ── Status ──

    fn set_status(&self, status: AdapterStatus) {
        let callback = {
            let mut current = self.status.lock().unwrap();
            if *current == status {
                return;
            }
            match &status {
                AdapterStatus::Detected => log::info!("GC adapter detected"),
                AdapterStatus::NotDetected => log::info!("GC adapter detached"),
                AdapterStatus::Error(e) => log::warn!("GC adapter unavailable: {e}"),
            }
            *current = status;
            self.status_callback.lock().unwrap().clone()
        };
        // Outside the status lock so the callback may query status.
        if let Some(callback) = callback {
            callback();
        }
    }
}

// ── Adapter ──

/// Owned driver instance with explicit lifecycle.
///
/// All methods take `&self`; the instance is meant to be shared (e.g.
/// behind an `Arc`) between the emulation loop and a UI thread.
pub struct Adapter {
    shared: Arc<Shared>,
    config_store: Arc<ConfigStore>,
    scan_thread: Mutex<Option<JoinHandle<()>>>,
    config_subscription: Mutex<Option<SubscriptionHandle>>,
    init_limiter: Mutex<InitLimiter>,
    initialized: AtomicBool,
}

impl Adapter {
    pub fn new(
        transport: Arc<dyn Transport>,
        config_store: Arc<ConfigStore>,
        options: AdapterOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            transport,
            options,
            session: Mutex::new(None),
            status: Mutex::new(AdapterStatus::NotDetected),
            status_callback: Mutex::new(None),
            input: Mutex::new(InputBuffer::new()),
            rumble: Mutex::new([0; PORT_COUNT]),
            rumble_ready: Event::new(),
            controller_types: Mutex::new([ControllerType::None; PORT_COUNT]),
            config: Mutex::new(config_store.get()),
            io_running: AtomicBool::new(false),
            scan_running: AtomicBool::new(false),
            pending_disconnect: AtomicBool::new(false),
        });
        Adapter {
            shared,
            config_store,
            scan_thread: Mutex::new(None),
            config_subscription: Mutex::new(None),
            init_limiter: Mutex::new(InitLimiter::new()),
            initialized: AtomicBool::new(false),
        }
    }

    // ── Lifecycle ──

    /// Bring the driver up: refresh the config snapshot, subscribe to
    /// config changes, and start scanning if any port wants the
    /// adapter. Idempotent while a session is open; rapid re-init
    /// calls while already running are absorbed.
    pub fn init(&self) {
        if self.shared.session.lock().unwrap().is_some() {
            return;
        }
        if !self
            .init_limiter
            .lock()
            .unwrap()
            .allow(self.initialized.load(Ordering::SeqCst))
        {
            return;
        }

        *self.shared.config.lock().unwrap() = self.config_store.get();

        let mut subscription = self.config_subscription.lock().unwrap();
        if subscription.is_none() {
            let shared = Arc::clone(&self.shared);
            let store = Arc::clone(&self.config_store);
            *subscription = Some(self.config_store.subscribe(move || {
                *shared.config.lock().unwrap() = store.get();
            }));
        }
        drop(subscription);

        self.initialized.store(true, Ordering::SeqCst);
        if self.use_adapter() {
            self.start_scan_thread();
        }
    }

    /// Stop scanning, tear down any open session and unsubscribe from
    /// config changes. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.stop_scan_thread();
        Shared::reset(&self.shared);
        if let Some(handle) = self.config_subscription.lock().unwrap().take() {
            self.config_store.unsubscribe(handle);
        }
        self.initialized.store(false, Ordering::SeqCst);
        self.init_limiter.lock().unwrap().clear();
    }

    /// Start the scan thread. No-op if it is already running.
    pub fn start_scan_thread(&self) {
        let mut handle = self.scan_thread.lock().unwrap();
        if handle.is_some() {
            return;
        }
        self.shared.scan_running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("gcadapter scan".into())
            .spawn(move || Shared::scan_loop(&shared))
        {
            Ok(thread) => *handle = Some(thread),
            Err(e) => {
                log::error!("failed to spawn scan thread: {e}");
                self.shared.scan_running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Stop and join the scan thread, waking it first if it is blocked
    /// waiting for bus events.
    pub fn stop_scan_thread(&self) {
        let handle = self.scan_thread.lock().unwrap().take();
        if let Some(handle) = handle {
            self.shared.scan_running.store(false, Ordering::SeqCst);
            self.shared.transport.wake();
            if handle.join().is_err() {
                log::error!("scan thread panicked");
            }
        }
    }

    // ── Per-frame API ──

    /// Latest decoded state for `port`.
    ///
    /// Neutral if the port is out of range or not configured for the
    /// adapter, no session is open, or no valid frame has arrived yet.
    /// On an empty-to-present transition the result carries the
    /// one-shot origin flag; an empty port carries the desync-detection
    /// error flag unless strict mode is on.
    pub fn input(&self, port: usize) -> PadState {
        if port >= PORT_COUNT {
            return PadState::default();
        }
        let config = *self.shared.config.lock().unwrap();
        if config.si_devices[port] != SiDeviceKind::WiiUAdapter
            || !self.shared.io_running.load(Ordering::SeqCst)
        {
            return PadState::default();
        }

        let (payload, size) = {
            let input = self.shared.input.lock().unwrap();
            (input.payload, input.size)
        };
        if !payload_valid(&payload, size) {
            if size != 0 {
                log::debug!("discarding input payload of size {size}");
            }
            return PadState::default();
        }

        let record = port_record(&payload, port);
        let kind = record_type(record);
        let previous = {
            let mut types = self.shared.controller_types.lock().unwrap();
            let previous = types[port];
            types[port] = kind;
            previous
        };

        if !kind.is_connected() {
            let mut pad = PadState::default();
            if !self.shared.options.strict_determinism {
                pad.buttons |= ERR_STATUS;
            }
            return pad;
        }

        let mut pad = decode_record(record);
        if previous == ControllerType::None {
            log::info!("controller connected to adapter port {}", port + 1);
            pad.buttons |= GET_ORIGIN;
        }
        pad
    }

    /// Stage a rumble command for `port` and wake the write thread.
    ///
    /// No-op unless the port is adapter-configured with rumble enabled
    /// and a session is open; wireless controllers and unchanged
    /// commands are skipped.
    pub fn output(&self, port: usize, command: u8) {
        if port >= PORT_COUNT {
            return;
        }
        let config = *self.shared.config.lock().unwrap();
        if config.si_devices[port] != SiDeviceKind::WiiUAdapter || !config.rumble_enabled[port] {
            return;
        }
        if !self.shared.io_running.load(Ordering::SeqCst) {
            return;
        }
        if self.shared.controller_types.lock().unwrap()[port] == ControllerType::Wireless {
            return;
        }

        let mut rumble = self.shared.rumble.lock().unwrap();
        if rumble[port] == command {
            return;
        }
        rumble[port] = command;
        drop(rumble);
        self.shared.rumble_ready.set();
    }

    /// Zero all rumble state and push one stop payload immediately.
    /// Best-effort: skips if a concurrent setup/teardown holds the
    /// lifecycle lock.
    pub fn reset_rumble(&self) {
        let session = match self.shared.session.try_lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        *self.shared.rumble.lock().unwrap() = [0; PORT_COUNT];
        if let Some(active) = session.as_ref() {
            let payload = rumble_payload(&[0; PORT_COUNT]);
            if let Err(e) = active.io.write_interrupt(&payload, TRANSFER_TIMEOUT) {
                log::warn!("rumble reset write: {e}");
            }
        }
    }

    // ── Accessors ──

    /// Whether the last decode saw a controller on `port`.
    pub fn device_connected(&self, port: usize) -> bool {
        port < PORT_COUNT && self.shared.controller_types.lock().unwrap()[port].is_connected()
    }

    /// Controller type seen by the last decode for `port`.
    pub fn controller_type(&self, port: usize) -> ControllerType {
        match self.shared.controller_types.lock().unwrap().get(port) {
            Some(kind) => *kind,
            None => ControllerType::None,
        }
    }

    /// Forget the tracked controller type for `port`; the next valid
    /// frame re-detects it (and re-arms the origin flag).
    pub fn reset_device_type(&self, port: usize) {
        if let Some(kind) = self.shared.controller_types.lock().unwrap().get_mut(port) {
            *kind = ControllerType::None;
        }
    }

    /// Whether any port is configured to use the adapter.
    pub fn use_adapter(&self) -> bool {
        self.shared.config.lock().unwrap().uses_adapter()
    }

    /// Current detection state plus a human-readable description when
    /// the adapter is present but unusable.
    pub fn is_detected(&self) -> (bool, Option<String>) {
        match &*self.shared.status.lock().unwrap() {
            AdapterStatus::Detected => (true, None),
            AdapterStatus::NotDetected => (false, None),
            AdapterStatus::Error(e) => (false, Some(e.to_string())),
        }
    }

    pub fn status(&self) -> AdapterStatus {
        self.shared.status.lock().unwrap().clone()
    }

    /// Register the status-change notification, replacing any previous
    /// one. Fired exactly once per actual transition.
    pub fn set_adapter_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.shared.status_callback.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn clear_adapter_callback(&self) {
        *self.shared.status_callback.lock().unwrap() = None;
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        encode_payload, encode_record, BUTTON_A, INPUT_HEADER_MARKER, PORT_RECORD_SIZE,
    };
    use crate::transport::mock::{MockIo, MockTransport};
    use crate::transport::DeviceId;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for: {what}");
    }

    struct Harness {
        transport: Arc<MockTransport>,
        config: Arc<ConfigStore>,
        adapter: Adapter,
    }

    fn harness(options: AdapterOptions) -> Harness {
        let transport = Arc::new(MockTransport::new());
        let config = Arc::new(ConfigStore::default());
        config.set_si_device(0, SiDeviceKind::WiiUAdapter);
        let adapter = Adapter::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&config),
            options,
        );
        Harness {
            transport,
            config,
            adapter,
        }
    }

    fn payload_with_port0(kind: ControllerType, buttons: u16) -> [u8; INPUT_PAYLOAD_SIZE] {
        let mut records = [[0u8; PORT_RECORD_SIZE]; PORT_COUNT];
        records[0] = encode_record(
            kind,
            &PadState {
                buttons,
                ..Default::default()
            },
        );
        encode_payload(&records)
    }

    fn plugged_io(payload: &[u8]) -> Arc<MockIo> {
        let io = Arc::new(MockIo::new());
        io.push_input(payload);
        io
    }

    #[test]
    fn claims_device_and_sends_init_first() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(Arc::clone(&io));

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);

        // Streaming-mode init first, then the rumble stop that clears
        // whatever a previous session left running; nothing else until
        // an output is staged.
        let writes = io.written();
        assert_eq!(writes[0], INIT_PAYLOAD.to_vec());
        assert_eq!(writes[1], vec![0x11, 0, 0, 0, 0]);
        assert_eq!(writes.len(), 2);
        assert_eq!(h.transport.claims.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn input_reports_origin_exactly_once() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, BUTTON_A));
        h.transport.plug(io);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);

        let mut first = PadState::default();
        wait_until("A button frame", || {
            first = h.adapter.input(0);
            first.buttons & BUTTON_A != 0
        });
        assert_ne!(first.buttons & GET_ORIGIN, 0, "first sighting sets origin");
        assert!(h.adapter.device_connected(0));

        // Same stable payload: same buttons, origin consumed.
        let second = h.adapter.input(0);
        assert_ne!(second.buttons & BUTTON_A, 0);
        assert_eq!(second.buttons & GET_ORIGIN, 0);

        // Forgetting the type re-arms the origin flag.
        h.adapter.reset_device_type(0);
        let third = h.adapter.input(0);
        assert_ne!(third.buttons & GET_ORIGIN, 0);
    }

    #[test]
    fn unconfigured_port_stays_neutral() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, BUTTON_A));
        h.transport.plug(io);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        wait_until("frame delivery", || {
            h.adapter.input(0).buttons & BUTTON_A != 0
        });

        // Port 1 is not adapter-configured: gate before decode.
        assert_eq!(h.adapter.input(1), PadState::default());
        assert!(!h.adapter.device_connected(1));
    }

    #[test]
    fn out_of_range_port_is_neutral() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, BUTTON_A));
        h.transport.plug(io);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);

        assert_eq!(h.adapter.input(PORT_COUNT), PadState::default());
        h.adapter.output(PORT_COUNT, 7);
        assert!(!h.adapter.device_connected(PORT_COUNT));
        assert_eq!(h.adapter.controller_type(9), ControllerType::None);
        h.adapter.reset_device_type(PORT_COUNT);
    }

    #[test]
    fn malformed_payload_is_neutral_and_marks_nothing() {
        let h = harness(AdapterOptions::default());
        let io = Arc::new(MockIo::new());
        let mut short = vec![0u8; 10];
        short[0] = INPUT_HEADER_MARKER;
        io.push_input(&short);
        h.transport.plug(io);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        thread::sleep(Duration::from_millis(50));

        for port in 0..PORT_COUNT {
            assert_eq!(h.adapter.input(port), PadState::default());
            assert!(!h.adapter.device_connected(port));
        }
    }

    #[test]
    fn empty_port_carries_error_flag_unless_strict() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::None, 0));
        h.transport.plug(io);
        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        wait_until("error-flagged frame", || {
            h.adapter.input(0).buttons & ERR_STATUS != 0
        });

        let strict = harness(AdapterOptions {
            strict_determinism: true,
        });
        let io = plugged_io(&payload_with_port0(ControllerType::None, 0));
        strict.transport.plug(io);
        strict.adapter.init();
        wait_until("detection", || strict.adapter.is_detected().0);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(strict.adapter.input(0), PadState::default());
    }

    #[test]
    fn rumble_write_with_duplicate_suppressed() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(Arc::clone(&io));

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        wait_until("controller tracked", || {
            h.adapter.input(0);
            h.adapter.device_connected(0)
        });

        h.adapter.output(0, 5);
        wait_until("rumble payload written", || io.written().len() == 3);
        assert_eq!(io.written()[2], vec![0x11, 5, 0, 0, 0]);

        // Unchanged command: no second write.
        h.adapter.output(0, 5);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(io.written().len(), 3);
    }

    #[test]
    fn output_is_noop_when_rumble_disabled() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(Arc::clone(&io));
        h.config.set_rumble_enabled(0, false);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        wait_until("controller tracked", || {
            h.adapter.input(0);
            h.adapter.device_connected(0)
        });

        h.adapter.output(0, 9);
        thread::sleep(Duration::from_millis(50));
        // Only the claim-time init and rumble stop payloads.
        assert_eq!(io.written().len(), 2);
    }

    #[test]
    fn output_skips_wireless_controllers() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wireless, 0));
        h.transport.plug(Arc::clone(&io));

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        wait_until("controller tracked", || {
            h.adapter.input(0);
            h.adapter.device_connected(0)
        });

        h.adapter.output(0, 3);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(io.written().len(), 2);
    }

    #[test]
    fn reset_rumble_pushes_stop_payload() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(Arc::clone(&io));

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);

        h.adapter.reset_rumble();
        let writes = io.written();
        assert_eq!(writes.last().unwrap(), &vec![0x11, 0, 0, 0, 0]);
    }

    #[test]
    fn reset_rumble_without_session_is_safe() {
        let h = harness(AdapterOptions::default());
        h.adapter.reset_rumble();
    }

    #[test]
    fn unplug_resets_and_notifies_once_per_transition() {
        let h = harness(AdapterOptions::default());
        let transitions = Arc::new(AtomicUsize::new(0));
        {
            let transitions = Arc::clone(&transitions);
            h.adapter.set_adapter_callback(move || {
                transitions.fetch_add(1, Ordering::SeqCst);
            });
        }

        let io = plugged_io(&payload_with_port0(ControllerType::Wired, BUTTON_A));
        h.transport.plug(Arc::clone(&io));
        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        wait_until("controller tracked", || {
            h.adapter.input(0);
            h.adapter.device_connected(0)
        });
        assert_eq!(transitions.load(Ordering::SeqCst), 1);

        // Device vanishes: transfers fail, re-claims fail.
        h.transport.unplug();
        io.unplugged.store(true, Ordering::SeqCst);
        wait_until("teardown", || !h.adapter.is_detected().0);

        assert_eq!(transitions.load(Ordering::SeqCst), 2);
        for port in 0..PORT_COUNT {
            assert!(!h.adapter.device_connected(port));
            assert_eq!(h.adapter.input(port), PadState::default());
        }
    }

    #[test]
    fn hotplug_left_event_for_open_device_triggers_reset() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        let id = io.id;
        h.transport.plug(Arc::clone(&io));
        h.transport.set_hotplug(true);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);

        h.transport.unplug();
        h.transport.push_event(HotplugEvent::Left(id));
        wait_until("teardown", || !h.adapter.is_detected().0);
    }

    #[test]
    fn unrelated_left_event_is_ignored() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(io);
        h.transport.set_hotplug(true);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);

        h.transport
            .push_event(HotplugEvent::Left(DeviceId { bus: 9, address: 9 }));
        thread::sleep(Duration::from_millis(50));
        assert!(h.adapter.is_detected().0);
    }

    #[test]
    fn claim_error_surfaces_then_clears_on_neutral_scan() {
        let h = harness(AdapterOptions::default());
        h.transport.plug(Arc::new(MockIo::new()));
        h.transport
            .fail_claims_with(ClaimError::PermissionDenied("mock: access".into()));

        h.adapter.init();
        wait_until("error status", || h.adapter.is_detected().1.is_some());
        let (detected, message) = h.adapter.is_detected();
        assert!(!detected);
        assert!(message.unwrap().contains("permission"));

        // Offending device gone: next pass is neutral and clears it.
        h.transport.clear_claim_error();
        h.transport.unplug();
        h.transport.push_event(HotplugEvent::Arrived);
        wait_until("status cleared", || h.adapter.is_detected() == (false, None));
    }

    #[test]
    fn reset_without_session_is_noop_without_callback() {
        let h = harness(AdapterOptions::default());
        let transitions = Arc::new(AtomicUsize::new(0));
        {
            let transitions = Arc::clone(&transitions);
            h.adapter.set_adapter_callback(move || {
                transitions.fetch_add(1, Ordering::SeqCst);
            });
        }
        Shared::reset(&h.adapter.shared);
        assert_eq!(h.adapter.status(), AdapterStatus::NotDetected);
        assert_eq!(transitions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reset_reports_skip_while_lifecycle_lock_is_held() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(Arc::clone(&io));

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        h.adapter.stop_scan_thread();

        let guard = h.adapter.shared.session.lock().unwrap();
        assert!(!Shared::reset(&h.adapter.shared));
        assert!(h.adapter.is_detected().0, "session survives a skipped reset");
        drop(guard);

        h.transport.unplug();
        assert!(Shared::reset(&h.adapter.shared));
        assert!(!h.adapter.is_detected().0);
    }

    #[test]
    fn disconnect_is_retried_when_reset_loses_the_lock() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(Arc::clone(&io));

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);

        // Hold the lifecycle lock across a scan pass so the disconnect
        // handler loses the try_lock race; the flag must survive it.
        let guard = h.adapter.shared.session.lock().unwrap();
        h.transport.unplug();
        h.adapter
            .shared
            .pending_disconnect
            .store(true, Ordering::SeqCst);
        h.transport.wake();
        thread::sleep(Duration::from_millis(100));
        drop(guard);

        wait_until("deferred teardown", || !h.adapter.is_detected().0);
    }

    #[test]
    fn init_without_adapter_ports_does_not_scan() {
        let transport = Arc::new(MockTransport::new());
        let config = Arc::new(ConfigStore::default());
        let adapter = Adapter::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            config,
            AdapterOptions::default(),
        );
        transport.plug(Arc::new(MockIo::new()));

        adapter.init();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(transport.claims.load(Ordering::SeqCst), 0);
        assert!(!adapter.is_detected().0);
    }

    #[test]
    fn config_change_is_picked_up_live() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, BUTTON_A));
        h.transport.plug(io);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        wait_until("frame delivery", || {
            h.adapter.input(0).buttons & BUTTON_A != 0
        });

        // Deconfigure the port: input gates to neutral immediately.
        h.config.set_si_device(0, SiDeviceKind::None);
        assert_eq!(h.adapter.input(0), PadState::default());
        assert!(!h.adapter.use_adapter());
    }

    #[test]
    fn shutdown_is_idempotent_and_stops_everything() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(io);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);

        h.adapter.shutdown();
        assert!(!h.adapter.is_detected().0);
        assert!(!h.adapter.shared.scan_running.load(Ordering::SeqCst));
        h.adapter.shutdown();
    }

    #[test]
    fn init_is_idempotent_with_open_session() {
        let h = harness(AdapterOptions::default());
        let io = plugged_io(&payload_with_port0(ControllerType::Wired, 0));
        h.transport.plug(io);

        h.adapter.init();
        wait_until("detection", || h.adapter.is_detected().0);
        h.adapter.init();
        assert_eq!(h.transport.claims.load(Ordering::SeqCst), 1);
        assert!(h.adapter.is_detected().0);
    }
}
