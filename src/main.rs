//! Playmobil RC racer demo.
//!
//! Drives the racer at the address given on the command line, or scans
//! for racers and drives the closest one.

use std::{env, process::ExitCode, str::FromStr};

use bluer::Address;
use log::{debug, error, info};

use bluetooth::{bluez::BluezRadio, scanner::Scanner};
use config::Config;
use racer::{
   controller::{Racer, RacerSettings},
   device,
};

mod bluetooth;
mod config;
mod error;
mod racer;

use crate::error::{RacerError, Result};

/// Repeats of the demo's forward ramp.
const DEMO_REPEAT: i32 = 20;
/// Steps of the demo's forward ramp.
const DEMO_STEPS: i32 = 5;

#[tokio::main]
async fn main() -> ExitCode {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   match run(env::args().nth(1)).await {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => {
         error!("{e}");
         ExitCode::FAILURE
      },
   }
}

async fn run(address: Option<String>) -> Result<()> {
   let config = Config::load()?;
   let mut radio = BluezRadio::open(config.adapter_index, config.connect_timeout()).await?;

   let address = match address {
      Some(address) => {
         Address::from_str(&address).map_err(|_| RacerError::InvalidAddress(address))?
      },
      None => select_closest(&mut radio, &config).await?,
   };

   Racer::with_connection(
      &mut radio,
      address,
      RacerSettings::from(&config),
      async |racer| {
         info!("Driving racer {}", racer.address());
         racer.set_light(true).await?;
         racer.set_speed(config.demo_speed).await?;
         racer.move_to(128, 128, DEMO_REPEAT, DEMO_STEPS).await?;
         racer.stop().await?;
         debug!("Vehicle state after demo: {:?}", racer.vehicle());
         Ok(())
      },
   )
   .await
}

async fn select_closest(radio: &mut BluezRadio, config: &Config) -> Result<Address> {
   let racers = Scanner::new(radio)
      .scan_with_escalating_timeouts(&config.scan_timeouts(), config.passive_scan)
      .await?;

   let closest = device::closest(&racers).ok_or(RacerError::DeviceNotFound)?;
   for found in &racers {
      let marker = if found == closest { '*' } else { ' ' };
      println!("{marker} {found}");
   }
   Ok(closest.address)
}
