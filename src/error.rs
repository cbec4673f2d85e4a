//! Error types for the racer controller.
//!
//! Every fallible operation in the crate returns [`RacerError`], covering
//! the BlueZ transport, configuration I/O, and the vehicle protocol.

use bluer::Address;
use thiserror::Error;

/// Main error type for discovery and control of a racer.
#[derive(Error, Debug)]
pub enum RacerError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("No Playmobil racer found")]
   DeviceNotFound,

   #[error("Link to vehicle disconnected")]
   LinkDisconnected,

   #[error("Control characteristic not found on {0}")]
   CharacteristicUnresolved(Address),

   #[error("Request timeout")]
   RequestTimeout,

   #[error("Invalid Bluetooth address: {0}")]
   InvalidAddress(String),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("Adapter not available")]
   AdapterNotAvailable,
}

/// Convenience type alias for Results with `RacerError`.
pub type Result<T> = std::result::Result<T, RacerError>;
