//! Per-port configuration — TOML-based, with change subscriptions.
//!
//! The driver does not own configuration; it consumes a snapshot from a
//! [`ConfigStore`] and re-reads it whenever the store reports a change.
//! The store itself persists to a platform-appropriate TOML file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};
use crate::protocol::PORT_COUNT;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# gcadapter configuration — changes made outside the app may be overwritten.\n\n";

// ── Port device kinds ──

/// What the emulated serial-interface port is configured to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiDeviceKind {
    /// Port empty.
    #[default]
    None,
    /// Standard emulated controller (not adapter-backed).
    GcController,
    /// This port is driven by the USB adapter.
    WiiUAdapter,
}

// ── Snapshot ──

/// Per-port configuration consumed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortsConfig {
    /// Device kind per port.
    #[serde(default)]
    pub si_devices: [SiDeviceKind; PORT_COUNT],
    /// Whether rumble commands are forwarded, per port.
    #[serde(default = "default_rumble")]
    pub rumble_enabled: [bool; PORT_COUNT],
}

fn default_rumble() -> [bool; PORT_COUNT] {
    [true; PORT_COUNT]
}

impl Default for PortsConfig {
    fn default() -> Self {
        PortsConfig {
            si_devices: [SiDeviceKind::None; PORT_COUNT],
            rumble_enabled: default_rumble(),
        }
    }
}

impl PortsConfig {
    /// Whether any port is configured to use the adapter.
    pub fn uses_adapter(&self) -> bool {
        self.si_devices
            .iter()
            .any(|&kind| kind == SiDeviceKind::WiiUAdapter)
    }
}

// ── Store ──

/// Handle returned by [`ConfigStore::subscribe`]; pass back to
/// [`ConfigStore::unsubscribe`] to stop receiving notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Mutable configuration store with change notifications.
///
/// Single-writer (whoever calls the setters), multi-reader. Callbacks
/// run on the mutating thread and must not call back into the store's
/// setters.
pub struct ConfigStore {
    inner: Mutex<PortsConfig>,
    subscribers: Mutex<Vec<(u64, ChangeCallback)>>,
    next_id: AtomicU64,
}

impl ConfigStore {
    pub fn new(config: PortsConfig) -> Self {
        ConfigStore {
            inner: Mutex::new(config),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> PortsConfig {
        *self.inner.lock().unwrap()
    }

    pub fn set_si_device(&self, port: usize, kind: SiDeviceKind) {
        self.inner.lock().unwrap().si_devices[port] = kind;
        self.notify();
    }

    pub fn set_rumble_enabled(&self, port: usize, enabled: bool) {
        self.inner.lock().unwrap().rumble_enabled[port] = enabled;
        self.notify();
    }

    /// Replace the whole snapshot (e.g. after reloading from disk).
    pub fn replace(&self, config: PortsConfig) {
        *self.inner.lock().unwrap() = config;
        self.notify();
    }

    /// Register a change callback, fired after every mutation.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        SubscriptionHandle(id)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != handle.0);
    }

    fn notify(&self) {
        // Clone out of the lock so callbacks can subscribe/unsubscribe.
        let callbacks: Vec<ChangeCallback> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback();
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(PortsConfig::default())
    }
}

// ── Persistence ──

/// Platform config file path (`<config dir>/gcadapter/config.toml`).
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gcadapter")
        .join("config.toml")
}

/// Load a config file, falling back to defaults if it does not exist.
pub fn load_or_default(path: &Path) -> Result<PortsConfig> {
    if !path.exists() {
        return Ok(PortsConfig::default());
    }
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| AdapterError::Config(format!("{}: {e}", path.display())))
}

/// Save a config file, creating parent directories as needed.
pub fn save(config: &PortsConfig, path: &Path) -> Result<()> {
    let body = toml::to_string_pretty(config)
        .map_err(|e| AdapterError::Config(format!("serialize: {e}")))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{CONFIG_HEADER}{body}"))?;
    Ok(())
}
