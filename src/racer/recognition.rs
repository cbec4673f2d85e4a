//! Recognition of racers from advertisement data.
//!
//! A racer is any connectable device whose complete local name starts
//! with [`NAME_PREFIX`]. Shortened names do not count.

use log::debug;

use crate::{
   bluetooth::radio::{AD_COMPLETE_LOCAL_NAME, RadioDevice},
   racer::{device::DiscoveredDevice, protocol::NAME_PREFIX},
};

/// First complete local name among the advertisement records.
pub fn complete_local_name(device: &RadioDevice) -> Option<&str> {
   device
      .records
      .iter()
      .find(|record| record.code == AD_COMPLETE_LOCAL_NAME)
      .and_then(|record| record.as_text())
}

pub fn recognize(device: &RadioDevice) -> Option<DiscoveredDevice> {
   if !device.connectable {
      return None;
   }
   let name = complete_local_name(device)?;
   if !name.starts_with(NAME_PREFIX) {
      return None;
   }
   debug!(
      "Racer detected via local name: {name} ({}, {} dBm)",
      device.address, device.signal_strength
   );
   Some(DiscoveredDevice::new(
      device.address,
      name,
      device.signal_strength,
   ))
}
