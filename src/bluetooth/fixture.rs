//! Scripted radio used by unit tests.
//!
//! Every call made through the radio traits is appended to a shared call
//! log so tests can assert on the exact sequence of radio operations.

use std::{collections::VecDeque, io, sync::Arc, time::Duration};

use bluer::Address;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
   bluetooth::radio::{Characteristic, Link, Radio, RadioDevice},
   error::{RacerError, Result},
   racer::protocol::CONTROL_CHARACTERISTIC,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
   ScanStart { passive: bool },
   ScanStop,
   ScanProcess(Duration),
   ScanAbort,
   Connect(Address, u32),
   FindCharacteristics(Uuid),
   Write(Vec<u8>),
   Disconnect,
   Release,
}

/// Outcome of one characteristic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
   Ok,
   Disconnected,
   Failed,
}

#[derive(Default)]
struct Script {
   calls: Vec<RadioCall>,
   scans: VecDeque<Option<Vec<RadioDevice>>>,
   writes: VecDeque<WriteOutcome>,
   missing_characteristic: bool,
   refuse_connect: bool,
}

#[derive(Clone, Default)]
pub struct FixtureRadio {
   script: Arc<Mutex<Script>>,
}

impl FixtureRadio {
   pub fn new() -> Self {
      Self::default()
   }

   /// Queues the result of the next `scan_process` call.
   pub fn push_scan(&self, devices: Vec<RadioDevice>) -> &Self {
      self.script.lock().scans.push_back(Some(devices));
      self
   }

   /// Makes the next `scan_process` call fail as if the adapter vanished.
   pub fn push_scan_error(&self) -> &Self {
      self.script.lock().scans.push_back(None);
      self
   }

   /// Queues the outcome of the next write; unscripted writes succeed.
   pub fn push_write(&self, outcome: WriteOutcome) -> &Self {
      self.script.lock().writes.push_back(outcome);
      self
   }

   pub fn without_characteristic(&self) -> &Self {
      self.script.lock().missing_characteristic = true;
      self
   }

   pub fn refuse_connect(&self) -> &Self {
      self.script.lock().refuse_connect = true;
      self
   }

   pub fn calls(&self) -> Vec<RadioCall> {
      self.script.lock().calls.clone()
   }

   /// Payloads of every attempted write, successful or not.
   pub fn writes(&self) -> Vec<Vec<u8>> {
      self
         .calls()
         .into_iter()
         .filter_map(|call| match call {
            RadioCall::Write(data) => Some(data),
            _ => None,
         })
         .collect()
   }

   fn record(&self, call: RadioCall) {
      self.script.lock().calls.push(call);
   }
}

impl Radio for FixtureRadio {
   type Link = FixtureLink;

   async fn scan_start(&mut self, passive: bool) -> Result<()> {
      self.record(RadioCall::ScanStart { passive });
      Ok(())
   }

   async fn scan_stop(&mut self) -> Result<()> {
      self.record(RadioCall::ScanStop);
      Ok(())
   }

   async fn scan_process(&mut self, timeout: Duration) -> Result<Vec<RadioDevice>> {
      self.record(RadioCall::ScanProcess(timeout));
      match self.script.lock().scans.pop_front() {
         Some(Some(devices)) => Ok(devices),
         Some(None) => Err(RacerError::AdapterNotAvailable),
         None => Ok(Vec::new()),
      }
   }

   fn scan_abort(&mut self) {
      self.record(RadioCall::ScanAbort);
   }

   async fn connect(&mut self, address: Address, adapter_index: u32) -> Result<FixtureLink> {
      self.record(RadioCall::Connect(address, adapter_index));
      if self.script.lock().refuse_connect {
         return Err(RacerError::AdapterNotAvailable);
      }
      Ok(FixtureLink {
         radio: self.clone(),
      })
   }
}

pub struct FixtureLink {
   radio: FixtureRadio,
}

impl Link for FixtureLink {
   type Characteristic = FixtureCharacteristic;

   async fn find_characteristics(&self, uuid: Uuid) -> Result<Vec<FixtureCharacteristic>> {
      self.radio.record(RadioCall::FindCharacteristics(uuid));
      if uuid != CONTROL_CHARACTERISTIC || self.radio.script.lock().missing_characteristic {
         return Ok(Vec::new());
      }
      Ok(vec![FixtureCharacteristic {
         radio: self.radio.clone(),
      }])
   }

   async fn disconnect(self) -> Result<()> {
      self.radio.record(RadioCall::Disconnect);
      Ok(())
   }

   fn release(self) {
      self.radio.record(RadioCall::Release);
   }
}

pub struct FixtureCharacteristic {
   radio: FixtureRadio,
}

impl Characteristic for FixtureCharacteristic {
   async fn write(&self, data: &[u8]) -> Result<()> {
      self.radio.record(RadioCall::Write(data.to_vec()));
      let outcome = self
         .radio
         .script
         .lock()
         .writes
         .pop_front()
         .unwrap_or(WriteOutcome::Ok);
      match outcome {
         WriteOutcome::Ok => Ok(()),
         WriteOutcome::Disconnected => Err(RacerError::LinkDisconnected),
         WriteOutcome::Failed => Err(RacerError::Io(io::Error::other("write rejected"))),
      }
   }
}
