//! Error types for the gcadapter-lib crate.
//!
//! String payloads follow the convention **"context: details"** where
//! *context* identifies the operation or step (e.g. `"open"`,
//! `"claim interface 0"`) and *details* describes what went wrong.
//! Claim-time and transfer-time errors are separate enums because they
//! propagate differently: claim failures become a diagnosable adapter
//! status, transfer failures stay inside the I/O threads.

use std::fmt;

// ── Claim errors ──

/// Why a matching device could not be claimed.
///
/// Each variant maps to a distinct adapter status so the user can tell
/// a permissions problem apart from a flaky open. `PermissionDenied`
/// in particular is non-retriable without external action (udev rules,
/// elevated privileges) and is reported as such.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// No device with the expected vendor/product pair on the bus.
    NotFound,
    /// Device metadata could not be read; candidate skipped.
    Descriptor(String),
    /// Device exists but the process may not open it.
    PermissionDenied(String),
    /// Opening the device failed for a reason other than permissions.
    Open(String),
    /// A kernel driver holds the interface and could not be detached.
    DetachFailed(String),
    /// Claiming the interface failed.
    Claim(String),
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::NotFound => write!(f, "GC adapter not found"),
            ClaimError::Descriptor(e) => write!(f, "Failed to read device descriptor: {e}"),
            ClaimError::PermissionDenied(e) => {
                write!(f, "No permission to access the GC adapter: {e}")
            }
            ClaimError::Open(e) => write!(f, "Failed to open device: {e}"),
            ClaimError::DetachFailed(e) => write!(f, "Failed to detach kernel driver: {e}"),
            ClaimError::Claim(e) => write!(f, "Failed to claim interface: {e}"),
        }
    }
}

impl std::error::Error for ClaimError {}

// ── Transfer errors ──

/// A single interrupt-transfer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The transfer did not complete within its timeout. Expected
    /// during normal operation; the loop simply retries.
    Timeout,
    /// The device is gone. Triggers a full session reset.
    Disconnected(String),
    /// Any other transfer failure; logged, loop continues.
    Io(String),
}

impl TransferError {
    /// Whether this failure means the device has left the bus.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransferError::Disconnected(_))
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Timeout => write!(f, "transfer timed out"),
            TransferError::Disconnected(e) => write!(f, "device disconnected: {e}"),
            TransferError::Io(e) => write!(f, "transfer failed: {e}"),
        }
    }
}

impl std::error::Error for TransferError {}

// ── Unified error ──

/// Unified error type for gcadapter-lib operations.
#[derive(Debug)]
pub enum AdapterError {
    /// Device discovery/claim error.
    Claim(ClaimError),
    /// Interrupt transfer error.
    Transfer(TransferError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration parse/validation error.
    Config(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Claim(e) => write!(f, "{e}"),
            AdapterError::Transfer(e) => write!(f, "{e}"),
            AdapterError::Io(e) => write!(f, "I/O error: {e}"),
            AdapterError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdapterError::Claim(e) => Some(e),
            AdapterError::Transfer(e) => Some(e),
            AdapterError::Io(e) => Some(e),
            AdapterError::Config(_) => None,
        }
    }
}

impl From<ClaimError> for AdapterError {
    fn from(e: ClaimError) -> Self {
        AdapterError::Claim(e)
    }
}

impl From<TransferError> for AdapterError {
    fn from(e: TransferError) -> Self {
        AdapterError::Transfer(e)
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(e: std::io::Error) -> Self {
        AdapterError::Io(e)
    }
}

/// Crate-level Result alias using [`AdapterError`].
pub type Result<T> = std::result::Result<T, AdapterError>;
