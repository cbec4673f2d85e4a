//! Racers found during a scan.

use std::{
   fmt,
   hash::{Hash, Hasher},
};

use bluer::Address;
use smol_str::SmolStr;

/// A racer seen advertising during one scan pass.
///
/// Two results are the same racer when their addresses match, whatever
/// their signal strength. Ranking goes through [`closest`] instead.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
   pub address: Address,
   pub advertised_name: SmolStr,
   pub signal_strength: i16,
}

impl DiscoveredDevice {
   pub fn new(address: Address, advertised_name: impl Into<SmolStr>, signal_strength: i16) -> Self {
      Self {
         address,
         advertised_name: advertised_name.into(),
         signal_strength,
      }
   }
}

impl PartialEq for DiscoveredDevice {
   fn eq(&self, other: &Self) -> bool {
      self.address == other.address
   }
}

impl Eq for DiscoveredDevice {}

impl Hash for DiscoveredDevice {
   fn hash<H: Hasher>(&self, state: &mut H) {
      self.address.hash(state);
   }
}

impl fmt::Display for DiscoveredDevice {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{} - {}", self.address, self.advertised_name)
   }
}

/// Picks the strongest signal; ties go to the earliest discovered.
pub fn closest(devices: &[DiscoveredDevice]) -> Option<&DiscoveredDevice> {
   devices.iter().reduce(|best, candidate| {
      if candidate.signal_strength > best.signal_strength {
         candidate
      } else {
         best
      }
   })
}
