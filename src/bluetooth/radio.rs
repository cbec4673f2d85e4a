//! Radio abstraction used by the scanner and the racer controller.
//!
//! The controller never talks to BlueZ directly. It goes through
//! [`Radio`], [`Link`] and [`Characteristic`] so that the discovery and
//! command logic can be driven by a scripted radio in tests.

use std::time::Duration;

use bluer::Address;
use smol_str::SmolStr;
use uuid::Uuid;

use crate::error::Result;

/// AD type of the complete local name.
pub const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
/// AD type of manufacturer specific data.
pub const AD_MANUFACTURER_DATA: u8 = 0xFF;

const AD_TYPE_NAMES: &[(u8, &str)] = &[
   (0x01, "Flags"),
   (0x02, "Incomplete 16b Services"),
   (0x03, "Complete 16b Services"),
   (0x06, "Incomplete 128b Services"),
   (0x07, "Complete 128b Services"),
   (0x08, "Short Local Name"),
   (AD_COMPLETE_LOCAL_NAME, "Complete Local Name"),
   (0x0A, "Tx Power"),
   (0x16, "16b Service Data"),
   (AD_MANUFACTURER_DATA, "Manufacturer"),
];

/// Human readable name of an AD structure type.
pub fn ad_type_name(code: u8) -> &'static str {
   AD_TYPE_NAMES
      .binary_search_by_key(&code, |(c, _)| *c)
      .map_or("Unknown", |i| AD_TYPE_NAMES[i].1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdValue {
   Text(SmolStr),
   Bytes(Vec<u8>),
}

/// A single advertisement structure reported for a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdRecord {
   pub code: u8,
   pub type_name: &'static str,
   pub value: AdValue,
}

impl AdRecord {
   pub fn text(code: u8, value: impl Into<SmolStr>) -> Self {
      Self {
         code,
         type_name: ad_type_name(code),
         value: AdValue::Text(value.into()),
      }
   }

   pub fn bytes(code: u8, value: Vec<u8>) -> Self {
      Self {
         code,
         type_name: ad_type_name(code),
         value: AdValue::Bytes(value),
      }
   }

   /// Value as text, decoding raw bytes as UTF-8 when possible.
   pub fn as_text(&self) -> Option<&str> {
      match &self.value {
         AdValue::Text(text) => Some(text),
         AdValue::Bytes(bytes) => str::from_utf8(bytes).ok(),
      }
   }
}

/// A device seen by the radio during a scan session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioDevice {
   pub address: Address,
   pub connectable: bool,
   pub signal_strength: i16,
   pub records: Vec<AdRecord>,
}

/// Scanning and connection primitives provided by a Bluetooth stack.
pub trait Radio {
   type Link: Link;

   async fn scan_start(&mut self, passive: bool) -> Result<()>;

   async fn scan_stop(&mut self) -> Result<()>;

   /// Collects advertisements for `timeout` and returns every device seen
   /// since the session started.
   async fn scan_process(&mut self, timeout: Duration) -> Result<Vec<RadioDevice>>;

   /// Ends an active scan session without waiting, for drop paths.
   fn scan_abort(&mut self);

   async fn connect(&mut self, address: Address, adapter_index: u32) -> Result<Self::Link>;
}

/// An established connection to a peripheral.
pub trait Link {
   type Characteristic: Characteristic;

   async fn find_characteristics(&self, uuid: Uuid) -> Result<Vec<Self::Characteristic>>;

   async fn disconnect(self) -> Result<()>;

   /// Tears the link down in the background, for drop paths.
   fn release(self);
}

pub trait Characteristic {
   /// Writes `data`, failing with `RacerError::LinkDisconnected` when the
   /// link is gone.
   async fn write(&self, data: &[u8]) -> Result<()>;
}
