//! gcadapter — driver for the Nintendo WUP-028 GameCube controller adapter.

pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod scan;
pub mod sync;
pub mod transport;
pub mod usb;

pub use driver::{Adapter, AdapterOptions, AdapterStatus};
pub use error::AdapterError;
