//! BlueZ implementation of the radio traits.
//!
//! This module handles adapter selection and power management, LE
//! discovery sessions, and GATT connections through `bluer`.

use std::{pin::Pin, time::Duration};

use bluer::{Adapter, AdapterEvent, Address, Device, DiscoveryFilter, DiscoveryTransport, Session};
use futures::stream::{Stream, StreamExt};
use log::{debug, info, warn};
use smol_str::{SmolStr, format_smolstr};
use tokio::{
   runtime::Handle,
   time::{self, Instant},
};
use uuid::Uuid;

use crate::{
   bluetooth::radio::{
      AD_COMPLETE_LOCAL_NAME, AD_MANUFACTURER_DATA, AdRecord, Characteristic, Link, Radio,
      RadioDevice,
   },
   error::{RacerError, Result},
};

/// Maximum time to wait for GATT services after connecting
const SERVICES_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);
/// Polling interval while waiting for services
const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(100);

type DiscoveryStream = Pin<Box<dyn Stream<Item = AdapterEvent>>>;

fn adapter_name(index: u32) -> SmolStr {
   format_smolstr!("hci{index}")
}

/// Radio backed by a BlueZ adapter.
pub struct BluezRadio {
   session: Session,
   adapter: Adapter,
   connect_timeout: Duration,
   discovery: Option<DiscoveryStream>,
   seen: Vec<Address>,
}

impl BluezRadio {
   /// Opens `hci<adapter_index>` and powers it on if needed.
   pub async fn open(adapter_index: u32, connect_timeout: Duration) -> Result<Self> {
      let session = Session::new().await?;
      let adapter = Self::powered_adapter(&session, adapter_index).await?;
      Ok(Self {
         session,
         adapter,
         connect_timeout,
         discovery: None,
         seen: Vec::new(),
      })
   }

   async fn powered_adapter(session: &Session, index: u32) -> Result<Adapter> {
      let name = adapter_name(index);
      let adapter = session.adapter(&name).map_err(|e| {
         warn!("Failed to open adapter {name}: {e}");
         RacerError::AdapterNotAvailable
      })?;

      if !adapter.is_powered().await? {
         if let Err(e) = adapter.set_powered(true).await {
            warn!("Failed to power on adapter {name}: {e}");
            return Err(RacerError::AdapterNotAvailable);
         }
         info!("Powered on adapter: {name}");
      }
      Ok(adapter)
   }

   async fn describe(&self, address: Address) -> Result<Option<RadioDevice>> {
      let device = self.adapter.device(address)?;

      // Devices cached by BlueZ but not heard in this session carry no RSSI.
      let Some(signal_strength) = device.rssi().await? else {
         return Ok(None);
      };

      let mut records = Vec::new();
      if let Some(name) = device.name().await? {
         records.push(AdRecord::text(AD_COMPLETE_LOCAL_NAME, name));
      }
      if let Some(manufacturer_data) = device.manufacturer_data().await? {
         for (company, data) in manufacturer_data {
            let mut value = company.to_le_bytes().to_vec();
            value.extend_from_slice(&data);
            records.push(AdRecord::bytes(AD_MANUFACTURER_DATA, value));
         }
      }

      // BlueZ does not report whether an advertisement was connectable.
      Ok(Some(RadioDevice {
         address,
         connectable: true,
         signal_strength,
         records,
      }))
   }
}

impl Radio for BluezRadio {
   type Link = BluezLink;

   async fn scan_start(&mut self, passive: bool) -> Result<()> {
      if passive {
         debug!("BlueZ discovery is always active; ignoring passive request");
      }
      let mut filter = DiscoveryFilter::default();
      filter.transport = DiscoveryTransport::Le;
      filter.duplicate_data = true;
      self.adapter.set_discovery_filter(filter).await?;

      let events = self.adapter.discover_devices().await?;
      self.discovery = Some(Box::pin(events));
      self.seen.clear();
      info!("Started LE discovery on {}", self.adapter.name());
      Ok(())
   }

   async fn scan_stop(&mut self) -> Result<()> {
      // Dropping the event stream ends the discovery session.
      if self.discovery.take().is_some() {
         info!("Stopped LE discovery on {}", self.adapter.name());
      }
      Ok(())
   }

   async fn scan_process(&mut self, timeout: Duration) -> Result<Vec<RadioDevice>> {
      let Some(events) = self.discovery.as_mut() else {
         return Err(RacerError::AdapterNotAvailable);
      };

      let deadline = Instant::now() + timeout;
      loop {
         let event = time::timeout_at(deadline, events.next()).await;
         match event {
            Ok(Some(AdapterEvent::DeviceAdded(address))) => {
               if !self.seen.contains(&address) {
                  debug!("Device seen: {address}");
                  self.seen.push(address);
               }
            },
            Ok(Some(_)) => {},
            Ok(None) => {
               warn!("Discovery stream ended on {}", self.adapter.name());
               self.discovery = None;
               return Err(RacerError::AdapterNotAvailable);
            },
            Err(_) => break,
         }
      }

      let mut devices = Vec::with_capacity(self.seen.len());
      for &address in &self.seen {
         match self.describe(address).await {
            Ok(Some(device)) => devices.push(device),
            Ok(None) => {},
            Err(e) => debug!("Skipping {address}: {e}"),
         }
      }
      Ok(devices)
   }

   fn scan_abort(&mut self) {
      self.discovery = None;
   }

   async fn connect(&mut self, address: Address, adapter_index: u32) -> Result<BluezLink> {
      let adapter = if adapter_name(adapter_index).as_str() == self.adapter.name() {
         self.adapter.clone()
      } else {
         Self::powered_adapter(&self.session, adapter_index).await?
      };
      let device = adapter.device(address)?;

      info!("Connecting to {address} via {}", adapter.name());
      match time::timeout(self.connect_timeout, device.connect()).await {
         Ok(result) => result?,
         Err(_) => {
            warn!("Connection to {address} timed out");
            return Err(RacerError::RequestTimeout);
         },
      }

      let link = BluezLink { device };
      if let Err(e) = link.wait_for_services().await {
         link.release();
         return Err(e);
      }
      Ok(link)
   }
}

/// GATT connection to a single device.
pub struct BluezLink {
   device: Device,
}

impl BluezLink {
   async fn wait_for_services(&self) -> Result<()> {
      let wait = async {
         while !self.device.is_services_resolved().await? {
            time::sleep(SERVICES_POLL_INTERVAL).await;
         }
         Ok::<_, RacerError>(())
      };
      time::timeout(SERVICES_RESOLVE_TIMEOUT, wait)
         .await
         .map_err(|_| RacerError::RequestTimeout)?
   }
}

impl Link for BluezLink {
   type Characteristic = BluezCharacteristic;

   async fn find_characteristics(&self, uuid: Uuid) -> Result<Vec<BluezCharacteristic>> {
      let mut found = Vec::new();
      for service in self.device.services().await? {
         for characteristic in service.characteristics().await? {
            if characteristic.uuid().await? == uuid {
               found.push(BluezCharacteristic {
                  device: self.device.clone(),
                  inner: characteristic,
               });
            }
         }
      }
      Ok(found)
   }

   async fn disconnect(self) -> Result<()> {
      info!("Disconnecting from {}", self.device.address());
      self.device.disconnect().await?;
      Ok(())
   }

   fn release(self) {
      let address = self.device.address();
      match Handle::try_current() {
         Ok(handle) => {
            handle.spawn(async move {
               if let Err(e) = self.device.disconnect().await {
                  warn!("Background disconnect from {address} failed: {e}");
               }
            });
         },
         Err(_) => warn!("No runtime to disconnect {address}; link left to BlueZ"),
      }
   }
}

pub struct BluezCharacteristic {
   device: Device,
   inner: bluer::gatt::remote::Characteristic,
}

impl Characteristic for BluezCharacteristic {
   async fn write(&self, data: &[u8]) -> Result<()> {
      let Err(e) = self.inner.write(data).await else {
         return Ok(());
      };
      if self.device.is_connected().await.unwrap_or(false) {
         return Err(e.into());
      }
      debug!("Write failed on dropped link: {e}");
      Err(RacerError::LinkDisconnected)
   }
}
