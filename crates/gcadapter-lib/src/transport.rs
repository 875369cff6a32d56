//! Transport abstraction — trait + mock backend.
//!
//! The driver core is written against [`Transport`] / [`AdapterIo`] so
//! the scan/decode/state-machine logic is identical over real USB
//! ([`crate::usb::UsbTransport`]) and the in-memory mock used by tests.

use std::time::Duration;

use crate::error::{ClaimError, TransferError};

// ── Endpoints ──

/// The adapter's two interrupt endpoint addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPair {
    /// IN endpoint (input reports).
    pub input: u8,
    /// OUT endpoint (init + rumble payloads).
    pub output: u8,
}

/// Direction bit of a USB endpoint address.
const ENDPOINT_DIR_IN: u8 = 0x80;

/// Pick the IN/OUT endpoint pair from a device's endpoint addresses.
///
/// Returns `None` unless at least one endpoint of each direction is
/// present; on the real adapter there is exactly one of each.
pub fn resolve_endpoints(addresses: impl IntoIterator<Item = u8>) -> Option<EndpointPair> {
    let mut input = None;
    let mut output = None;
    for address in addresses {
        if address & ENDPOINT_DIR_IN != 0 {
            input.get_or_insert(address);
        } else {
            output.get_or_insert(address);
        }
    }
    Some(EndpointPair {
        input: input?,
        output: output?,
    })
}

// ── Hotplug ──

/// Bus identity of a device, used to match removal notifications
/// against the currently open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub bus: u8,
    pub address: u8,
}

/// Asynchronous bus notification delivered to the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    /// A matching device was attached.
    Arrived,
    /// A matching device left the bus.
    Left(DeviceId),
}

// ── Traits ──

/// A claimed adapter: blocking interrupt I/O on its two endpoints.
///
/// Dropping the handle releases the interface and closes the device;
/// a handle is only ever dropped after both I/O threads have been
/// joined.
pub trait AdapterIo: Send + Sync {
    /// Bus identity, for matching removal events.
    fn id(&self) -> DeviceId;

    /// Blocking interrupt read from the IN endpoint.
    fn read_interrupt(&self, buf: &mut [u8], timeout: Duration)
        -> Result<usize, TransferError>;

    /// Blocking interrupt write to the OUT endpoint.
    fn write_interrupt(&self, data: &[u8], timeout: Duration) -> Result<usize, TransferError>;
}

/// Transport backend: device discovery, claiming, and bus events.
pub trait Transport: Send + Sync {
    /// Scan the bus and claim the first matching adapter.
    ///
    /// `Err(ClaimError::NotFound)` is the quiet "nothing plugged in"
    /// outcome; every other variant is diagnosable and becomes the
    /// adapter's error status.
    fn open_adapter(&self) -> Result<Box<dyn AdapterIo>, ClaimError>;

    /// Whether arrival/removal events are pushed by the backend. When
    /// false the scan loop falls back to fixed-interval polling.
    fn hotplug_supported(&self) -> bool {
        false
    }

    /// Block up to `timeout` for bus activity, then return any pending
    /// events. An empty result after the full timeout is a normal poll
    /// pass. Must return promptly after [`Transport::wake`].
    fn wait_events(&self, timeout: Duration) -> Vec<HotplugEvent>;

    /// Wake a thread blocked in [`Transport::wait_events`].
    fn wake(&self);
}

// ── Mock transport for testing ──

/// In-memory transport for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::sync::Event;

    /// Scriptable adapter endpoint pair. Tests queue input payloads
    /// with [`MockIo::push_input`] and inspect everything the driver
    /// wrote via [`MockIo::writes`].
    pub struct MockIo {
        pub id: DeviceId,
        /// Scripted input payloads, consumed front-first.
        reads: Mutex<VecDeque<Vec<u8>>>,
        /// When the script runs dry, keep re-delivering the last
        /// payload (mimics the adapter's continuous report stream).
        repeat_last: AtomicBool,
        last_read: Mutex<Option<Vec<u8>>>,
        /// Every payload written to the OUT endpoint, in order.
        pub writes: Mutex<Vec<Vec<u8>>>,
        /// When set, all transfers fail as disconnected.
        pub unplugged: AtomicBool,
    }

    impl MockIo {
        pub fn new() -> Self {
            MockIo {
                id: DeviceId { bus: 1, address: 4 },
                reads: Mutex::new(VecDeque::new()),
                repeat_last: AtomicBool::new(true),
                last_read: Mutex::new(None),
                writes: Mutex::new(Vec::new()),
                unplugged: AtomicBool::new(false),
            }
        }

        /// Queue one input payload for the read thread.
        pub fn push_input(&self, payload: &[u8]) {
            self.reads.lock().unwrap().push_back(payload.to_vec());
        }

        /// Stop re-delivering the last payload once the queue is empty.
        pub fn set_repeat_last(&self, repeat: bool) {
            self.repeat_last.store(repeat, Ordering::SeqCst);
        }

        /// Payloads written so far (init, rumble).
        pub fn written(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl Default for MockIo {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AdapterIo for Arc<MockIo> {
        fn id(&self) -> DeviceId {
            self.id
        }

        fn read_interrupt(
            &self,
            buf: &mut [u8],
            timeout: Duration,
        ) -> Result<usize, TransferError> {
            if self.unplugged.load(Ordering::SeqCst) {
                return Err(TransferError::Disconnected("mock: unplugged".into()));
            }
            let next = {
                let mut reads = self.reads.lock().unwrap();
                match reads.pop_front() {
                    Some(payload) => {
                        *self.last_read.lock().unwrap() = Some(payload.clone());
                        Some(payload)
                    }
                    None if self.repeat_last.load(Ordering::SeqCst) => {
                        self.last_read.lock().unwrap().clone()
                    }
                    None => None,
                }
            };
            match next {
                Some(payload) => {
                    let n = payload.len().min(buf.len());
                    buf[..n].copy_from_slice(&payload[..n]);
                    Ok(n)
                }
                None => {
                    // Nothing scripted: behave like a quiet bus.
                    std::thread::sleep(timeout);
                    Err(TransferError::Timeout)
                }
            }
        }

        fn write_interrupt(
            &self,
            data: &[u8],
            _timeout: Duration,
        ) -> Result<usize, TransferError> {
            if self.unplugged.load(Ordering::SeqCst) {
                return Err(TransferError::Disconnected("mock: unplugged".into()));
            }
            self.writes.lock().unwrap().push(data.to_vec());
            Ok(data.len())
        }
    }

    /// Mock bus: at most one pluggable device plus a scriptable
    /// hotplug event queue.
    pub struct MockTransport {
        device: Mutex<Option<Arc<MockIo>>>,
        claim_error: Mutex<Option<ClaimError>>,
        events: Mutex<VecDeque<HotplugEvent>>,
        wake: Event,
        hotplug: AtomicBool,
        /// Number of successful claims, for assertions.
        pub claims: AtomicUsize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            MockTransport {
                device: Mutex::new(None),
                claim_error: Mutex::new(None),
                events: Mutex::new(VecDeque::new()),
                wake: Event::new(),
                hotplug: AtomicBool::new(false),
                claims: AtomicUsize::new(0),
            }
        }

        /// Attach a device; subsequent [`Transport::open_adapter`]
        /// calls claim it.
        pub fn plug(&self, io: Arc<MockIo>) {
            *self.device.lock().unwrap() = Some(io);
        }

        /// Detach the device (new claims fail with `NotFound`;
        /// existing handles keep their own `unplugged` flag).
        pub fn unplug(&self) {
            *self.device.lock().unwrap() = None;
        }

        /// Make the next claims fail with the given error.
        pub fn fail_claims_with(&self, error: ClaimError) {
            *self.claim_error.lock().unwrap() = Some(error);
        }

        pub fn clear_claim_error(&self) {
            *self.claim_error.lock().unwrap() = None;
        }

        pub fn set_hotplug(&self, supported: bool) {
            self.hotplug.store(supported, Ordering::SeqCst);
        }

        /// Deliver a hotplug event and wake the scan loop.
        pub fn push_event(&self, event: HotplugEvent) {
            self.events.lock().unwrap().push_back(event);
            self.wake.set();
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Transport for MockTransport {
        fn open_adapter(&self) -> Result<Box<dyn AdapterIo>, ClaimError> {
            if let Some(error) = self.claim_error.lock().unwrap().clone() {
                return Err(error);
            }
            match self.device.lock().unwrap().as_ref() {
                Some(io) => {
                    self.claims.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(Arc::clone(io)))
                }
                None => Err(ClaimError::NotFound),
            }
        }

        fn hotplug_supported(&self) -> bool {
            self.hotplug.load(Ordering::SeqCst)
        }

        fn wait_events(&self, timeout: Duration) -> Vec<HotplugEvent> {
            // Return immediately if events are already pending.
            if self.events.lock().unwrap().is_empty() {
                self.wake.wait_timeout(timeout);
            }
            self.events.lock().unwrap().drain(..).collect()
        }

        fn wake(&self) {
            self.wake.set();
        }
    }
}
