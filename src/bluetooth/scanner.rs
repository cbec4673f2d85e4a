//! Racer discovery.
//!
//! A [`Scanner`] borrows the radio exclusively for the length of a scan
//! session and tracks whether scanning is active, so the radio is only
//! ever told to stop a session it actually started.

use std::time::Duration;

use log::{debug, info, warn};

use crate::{
   bluetooth::radio::Radio,
   error::Result,
   racer::{device::DiscoveredDevice, recognition},
};

pub struct Scanner<'r, R: Radio> {
   radio: &'r mut R,
   started: bool,
}

impl<'r, R: Radio> Scanner<'r, R> {
   pub const fn new(radio: &'r mut R) -> Self {
      Self {
         radio,
         started: false,
      }
   }

   pub async fn start(&mut self, passive: bool) -> Result<()> {
      if self.started {
         debug!("Scan already active");
         return Ok(());
      }
      self.radio.scan_start(passive).await?;
      self.started = true;
      Ok(())
   }

   pub async fn stop(&mut self) -> Result<()> {
      if !self.started {
         return Ok(());
      }
      self.started = false;
      self.radio.scan_stop().await
   }

   /// Runs one discovery pass and returns every racer it saw.
   pub async fn collect(&mut self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
      let devices = self.radio.scan_process(timeout).await?;
      let mut racers = Vec::new();
      for device in &devices {
         match recognition::recognize(device) {
            Some(racer) => racers.push(racer),
            None => debug!(
               "Ignoring {} [{}]",
               device.address,
               device
                  .records
                  .iter()
                  .map(|record| record.type_name)
                  .collect::<Vec<_>>()
                  .join(", ")
            ),
         }
      }
      debug!(
         "Scan pass of {timeout:?} saw {} devices, {} racers",
         devices.len(),
         racers.len()
      );
      Ok(racers)
   }

   /// Scans with each timeout in turn until a pass finds a racer.
   ///
   /// The whole sequence runs inside one scan session, which is stopped
   /// whether or not a pass fails.
   pub async fn scan_with_escalating_timeouts(
      &mut self,
      timeouts: &[Duration],
      passive: bool,
   ) -> Result<Vec<DiscoveredDevice>> {
      self.start(passive).await?;
      let outcome = self.escalate(timeouts).await;
      let stopped = self.stop().await;

      let racers = outcome?;
      stopped?;
      Ok(racers)
   }

   async fn escalate(&mut self, timeouts: &[Duration]) -> Result<Vec<DiscoveredDevice>> {
      let mut racers = Vec::new();
      for &timeout in timeouts {
         racers = self.collect(timeout).await?;
         if !racers.is_empty() {
            info!("Found {} racers within {timeout:?}", racers.len());
            break;
         }
      }
      Ok(racers)
   }
}

impl<R: Radio> Drop for Scanner<'_, R> {
   fn drop(&mut self) {
      if self.started {
         warn!("Scanner dropped with an active session, aborting scan");
         self.started = false;
         self.radio.scan_abort();
      }
   }
}

#[cfg(test)]
mod tests {
   use bluer::Address;

   use super::*;
   use crate::{
      bluetooth::{
         fixture::{FixtureRadio, RadioCall},
         radio::{AD_COMPLETE_LOCAL_NAME, AdRecord, RadioDevice},
      },
      error::RacerError,
   };

   fn advertiser(last: u8, name: &str, signal_strength: i16) -> RadioDevice {
      RadioDevice {
         address: Address([0xC0, 0xFF, 0xEE, 0x00, 0x00, last]),
         connectable: true,
         signal_strength,
         records: vec![AdRecord::text(AD_COMPLETE_LOCAL_NAME, name)],
      }
   }

   fn escalating() -> Vec<Duration> {
      [100, 300, 1000, 3000]
         .into_iter()
         .map(Duration::from_millis)
         .collect()
   }

   #[tokio::test]
   async fn test_escalation_stops_at_first_match() -> Result<()> {
      let radio = FixtureRadio::new();
      radio
         .push_scan(vec![])
         .push_scan(vec![advertiser(1, "Headphones", -30)])
         .push_scan(vec![advertiser(2, "PM-RC 02", -55)])
         .push_scan(vec![advertiser(3, "PM-RC 03", -20)]);

      let mut handle = radio.clone();
      let racers = Scanner::new(&mut handle)
         .scan_with_escalating_timeouts(&escalating(), false)
         .await?;

      assert_eq!(racers.len(), 1);
      assert_eq!(racers[0].advertised_name, "PM-RC 02");
      assert_eq!(
         radio.calls(),
         vec![
            RadioCall::ScanStart { passive: false },
            RadioCall::ScanProcess(Duration::from_millis(100)),
            RadioCall::ScanProcess(Duration::from_millis(300)),
            RadioCall::ScanProcess(Duration::from_millis(1000)),
            RadioCall::ScanStop,
         ]
      );
      Ok(())
   }

   #[tokio::test]
   async fn test_escalation_without_match_returns_empty() -> Result<()> {
      let radio = FixtureRadio::new();
      let mut handle = radio.clone();

      let racers = Scanner::new(&mut handle)
         .scan_with_escalating_timeouts(&escalating(), true)
         .await?;

      assert!(racers.is_empty());
      let calls = radio.calls();
      assert_eq!(calls.first(), Some(&RadioCall::ScanStart { passive: true }));
      assert_eq!(calls.last(), Some(&RadioCall::ScanStop));
      assert_eq!(
         calls
            .iter()
            .filter(|call| matches!(call, RadioCall::ScanProcess(_)))
            .count(),
         4
      );
      Ok(())
   }

   #[tokio::test]
   async fn test_failed_pass_still_stops_session() {
      let radio = FixtureRadio::new();
      radio.push_scan(vec![]).push_scan_error();
      let mut handle = radio.clone();
      let mut scanner = Scanner::new(&mut handle);

      let result = scanner
         .scan_with_escalating_timeouts(&escalating(), false)
         .await;

      assert!(matches!(result, Err(RacerError::AdapterNotAvailable)));
      assert!(!scanner.started);
      drop(scanner);
      assert_eq!(
         radio.calls(),
         vec![
            RadioCall::ScanStart { passive: false },
            RadioCall::ScanProcess(Duration::from_millis(100)),
            RadioCall::ScanProcess(Duration::from_millis(300)),
            RadioCall::ScanStop,
         ]
      );
   }

   #[tokio::test]
   async fn test_start_and_stop_are_guarded() -> Result<()> {
      let radio = FixtureRadio::new();
      let mut handle = radio.clone();
      let mut scanner = Scanner::new(&mut handle);

      scanner.stop().await?;
      scanner.start(false).await?;
      scanner.start(false).await?;
      assert!(scanner.started);
      scanner.stop().await?;
      scanner.stop().await?;
      drop(scanner);

      assert_eq!(
         radio.calls(),
         vec![RadioCall::ScanStart { passive: false }, RadioCall::ScanStop]
      );
      Ok(())
   }

   #[tokio::test]
   async fn test_collect_keeps_duplicates_in_discovery_order() -> Result<()> {
      let radio = FixtureRadio::new();
      radio.push_scan(vec![
         advertiser(5, "PM-RC 05", -70),
         advertiser(4, "PM-RC 04", -40),
         advertiser(5, "PM-RC 05", -65),
      ]);
      let mut handle = radio.clone();
      let mut scanner = Scanner::new(&mut handle);

      scanner.start(false).await?;
      let racers = scanner.collect(Duration::from_millis(100)).await?;
      scanner.stop().await?;

      let names: Vec<_> = racers.iter().map(|r| r.advertised_name.as_str()).collect();
      assert_eq!(names, ["PM-RC 05", "PM-RC 04", "PM-RC 05"]);
      Ok(())
   }

   #[tokio::test]
   async fn test_dropping_active_scanner_aborts_session() -> Result<()> {
      let radio = FixtureRadio::new();
      let mut handle = radio.clone();
      {
         let mut scanner = Scanner::new(&mut handle);
         scanner.start(false).await?;
      }
      assert_eq!(
         radio.calls(),
         vec![RadioCall::ScanStart { passive: false }, RadioCall::ScanAbort]
      );
      Ok(())
   }
}
