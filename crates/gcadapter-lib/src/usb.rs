//! USB transport backend built on libusb (via `rusb`).
//!
//! Implements device discovery, claiming and interrupt I/O for the
//! WUP-028 adapter, plus hotplug notifications where libusb supports
//! them (falling back to scan-loop polling where it does not).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, UsbContext};

use crate::error::{ClaimError, TransferError};
use crate::protocol::{PRODUCT_ID, VENDOR_ID};
use crate::sync::Event;
use crate::transport::{
    resolve_endpoints, AdapterIo, DeviceId, EndpointPair, HotplugEvent, Transport,
};

/// Interface number claimed on the adapter.
const ADAPTER_INTERFACE: u8 = 0;

/// Timeout for the one-shot vendor init control transfer.
const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

// ── Probe ──

/// Whether a vendor/product pair identifies the adapter.
///
/// Pure descriptor inspection; candidates that do not match are skipped
/// with no side effects.
pub fn probe(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == VENDOR_ID && product_id == PRODUCT_ID
}

// ── Error mapping ──

fn open_error(err: rusb::Error, bus: u8, address: u8) -> ClaimError {
    match err {
        rusb::Error::Access => ClaimError::PermissionDenied(format!(
            "bus {bus:03} device {address:03}: {err}"
        )),
        _ => ClaimError::Open(format!("bus {bus:03} device {address:03}: {err}")),
    }
}

fn transfer_error(err: rusb::Error) -> TransferError {
    match err {
        rusb::Error::Timeout => TransferError::Timeout,
        rusb::Error::NoDevice | rusb::Error::NotFound => {
            TransferError::Disconnected(err.to_string())
        }
        _ => TransferError::Io(err.to_string()),
    }
}

// ── Claimed device ──

struct UsbAdapterIo {
    handle: DeviceHandle<Context>,
    endpoints: EndpointPair,
    id: DeviceId,
}

impl AdapterIo for UsbAdapterIo {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn read_interrupt(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransferError> {
        self.handle
            .read_interrupt(self.endpoints.input, buf, timeout)
            .map_err(transfer_error)
    }

    fn write_interrupt(&self, data: &[u8], timeout: Duration) -> Result<usize, TransferError> {
        self.handle
            .write_interrupt(self.endpoints.output, data, timeout)
            .map_err(transfer_error)
    }
}

impl Drop for UsbAdapterIo {
    fn drop(&mut self) {
        // Idempotent release: the handle closes when dropped; a failed
        // release on an already-gone device is expected noise.
        if let Err(e) = self.handle.release_interface(ADAPTER_INTERFACE) {
            log::debug!("release interface: {e}");
        }
    }
}

// ── Hotplug plumbing ──

type EventQueue = Arc<Mutex<VecDeque<HotplugEvent>>>;

struct HotplugMonitor {
    events: EventQueue,
}

impl rusb::Hotplug<Context> for HotplugMonitor {
    fn device_arrived(&mut self, _device: Device<Context>) {
        self.events.lock().unwrap().push_back(HotplugEvent::Arrived);
    }

    fn device_left(&mut self, device: Device<Context>) {
        self.events.lock().unwrap().push_back(HotplugEvent::Left(DeviceId {
            bus: device.bus_number(),
            address: device.address(),
        }));
    }
}

// ── Transport ──

/// libusb-backed [`Transport`].
pub struct UsbTransport {
    context: Context,
    events: EventQueue,
    hotplug_enabled: bool,
    /// Keeps the hotplug callback registered for the transport's life.
    _registration: Mutex<Option<rusb::Registration<Context>>>,
    /// Wake source for the poll fallback.
    poll_wake: Event,
}

impl UsbTransport {
    /// Initialize the libusb context and, when available, register for
    /// adapter arrival/removal notifications.
    pub fn new() -> Result<Self, ClaimError> {
        let context =
            Context::new().map_err(|e| ClaimError::Open(format!("libusb init: {e}")))?;

        let events: EventQueue = Arc::new(Mutex::new(VecDeque::new()));
        let mut registration = None;
        let mut hotplug_enabled = false;

        if rusb::has_hotplug() {
            let monitor = HotplugMonitor {
                events: Arc::clone(&events),
            };
            match rusb::HotplugBuilder::new()
                .vendor_id(VENDOR_ID)
                .product_id(PRODUCT_ID)
                .register(&context, Box::new(monitor))
            {
                Ok(reg) => {
                    registration = Some(reg);
                    hotplug_enabled = true;
                    log::info!("using libusb hotplug detection");
                }
                Err(e) => log::warn!("hotplug registration failed, polling instead: {e}"),
            }
        }

        Ok(UsbTransport {
            context,
            events,
            hotplug_enabled,
            _registration: Mutex::new(registration),
            poll_wake: Event::new(),
        })
    }

    fn claim_device(&self, device: &Device<Context>) -> Result<UsbAdapterIo, ClaimError> {
        let bus = device.bus_number();
        let address = device.address();
        log::info!(
            "found GC adapter {VENDOR_ID:04x}:{PRODUCT_ID:04x} on bus {bus:03} device {address:03}"
        );

        let handle = device
            .open()
            .map_err(|e| open_error(e, bus, address))?;

        // On macOS detaching needs an entitlement; assume the user runs
        // a codeless kext / has pre-detached and skip.
        #[cfg(not(target_os = "macos"))]
        match handle.kernel_driver_active(ADAPTER_INTERFACE) {
            Ok(true) => match handle.detach_kernel_driver(ADAPTER_INTERFACE) {
                Ok(()) | Err(rusb::Error::NotFound) | Err(rusb::Error::NotSupported) => {}
                Err(e) => return Err(ClaimError::DetachFailed(e.to_string())),
            },
            Ok(false) | Err(_) => {}
        }

        // Vendor init request. Makes Nyko-brand adapters work; Mayflash
        // clones answer with a pipe error, so a failure is not fatal.
        if let Err(e) =
            handle.write_control(0x21, 11, 0x0001, 0, &[], CONTROL_TIMEOUT)
        {
            log::warn!("vendor init control transfer failed: {e}");
        }

        handle
            .claim_interface(ADAPTER_INTERFACE)
            .map_err(|e| ClaimError::Claim(format!("interface {ADAPTER_INTERFACE}: {e}")))?;

        let config = device
            .active_config_descriptor()
            .map_err(|e| ClaimError::Descriptor(format!("config descriptor: {e}")))?;
        let addresses = config
            .interfaces()
            .flat_map(|i| i.descriptors())
            .flat_map(|d| d.endpoint_descriptors().map(|e| e.address()))
            .collect::<Vec<_>>();
        let endpoints = resolve_endpoints(addresses).ok_or_else(|| {
            ClaimError::Descriptor("no IN/OUT interrupt endpoint pair".into())
        })?;

        Ok(UsbAdapterIo {
            handle,
            endpoints,
            id: DeviceId { bus, address },
        })
    }
}

impl Transport for UsbTransport {
    fn open_adapter(&self) -> Result<Box<dyn AdapterIo>, ClaimError> {
        let devices = self
            .context
            .devices()
            .map_err(|e| ClaimError::Descriptor(format!("device list: {e}")))?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    log::debug!("skipping device with unreadable descriptor: {e}");
                    continue;
                }
            };
            if !probe(descriptor.vendor_id(), descriptor.product_id()) {
                continue;
            }
            // Claim the first match only; extra adapters stay untouched.
            return self
                .claim_device(&device)
                .map(|io| Box::new(io) as Box<dyn AdapterIo>);
        }

        Err(ClaimError::NotFound)
    }

    fn hotplug_supported(&self) -> bool {
        self.hotplug_enabled
    }

    fn wait_events(&self, timeout: Duration) -> Vec<HotplugEvent> {
        if self.hotplug_enabled {
            if self.events.lock().unwrap().is_empty() {
                // Pump libusb so the hotplug callback can run.
                if let Err(e) = self.context.handle_events(Some(timeout)) {
                    log::debug!("handle_events: {e}");
                }
            }
        } else {
            self.poll_wake.wait_timeout(timeout);
        }
        self.events.lock().unwrap().drain(..).collect()
    }

    fn wake(&self) {
        if self.hotplug_enabled {
            self.context.interrupt_handle_events();
        } else {
            self.poll_wake.set();
        }
    }
}
