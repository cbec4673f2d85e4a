//! Racer connection and command handling.
//!
//! A [`Racer`] owns the link to one vehicle, caches its control
//! characteristic, and turns motion and light requests into writes.
//! A write that fails because the link dropped reconnects and is resent
//! at most once.

use std::time::Duration;

use bluer::Address;
use log::{debug, info, warn};
use tokio::time;

use crate::{
   bluetooth::radio::{Characteristic, Link, Radio},
   config::Config,
   error::{RacerError, Result},
   racer::protocol::{self, CONTROL_CHARACTERISTIC, Command},
};

/// Default pause after each movement step.
pub const DEFAULT_MOVE_INTERVAL: Duration = Duration::from_millis(100);

type CharacteristicOf<R> = <<R as Radio>::Link as Link>::Characteristic;

/// Whether the control characteristic of a connected racer is known.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandleState {
   Cached,
   Unresolved,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkState {
   Disconnected,
   Connected(HandleState),
}

/// Last commanded motion of the racer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VehicleState {
   pub rotation: i32,
   pub direction: i32,
   pub move_interval: Duration,
}

impl Default for VehicleState {
   fn default() -> Self {
      Self {
         rotation: 0,
         direction: 0,
         move_interval: DEFAULT_MOVE_INTERVAL,
      }
   }
}

/// Connection parameters for a racer session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RacerSettings {
   pub adapter_index: u32,
   pub move_interval: Duration,
}

impl Default for RacerSettings {
   fn default() -> Self {
      Self {
         adapter_index: 0,
         move_interval: DEFAULT_MOVE_INTERVAL,
      }
   }
}

impl From<&Config> for RacerSettings {
   fn from(config: &Config) -> Self {
      Self {
         adapter_index: config.adapter_index,
         move_interval: config.move_interval(),
      }
   }
}

struct Connection<L: Link> {
   link: L,
   characteristic: Option<L::Characteristic>,
}

/// Controller for a single racer.
pub struct Racer<'r, R: Radio> {
   radio: &'r mut R,
   address: Address,
   adapter_index: u32,
   connection: Option<Connection<R::Link>>,
   vehicle: VehicleState,
}

impl<'r, R: Radio> Racer<'r, R> {
   pub fn new(radio: &'r mut R, address: Address, settings: RacerSettings) -> Self {
      Self {
         radio,
         address,
         adapter_index: settings.adapter_index,
         connection: None,
         vehicle: VehicleState {
            move_interval: settings.move_interval,
            ..VehicleState::default()
         },
      }
   }

   /// Connects, runs `body`, and disconnects on every return path.
   ///
   /// If `body` panics or the returned future is dropped early, the link
   /// is released in the background by the racer's `Drop`.
   pub async fn with_connection<T>(
      radio: &'r mut R,
      address: Address,
      settings: RacerSettings,
      body: impl AsyncFnOnce(&mut Self) -> Result<T>,
   ) -> Result<T> {
      let mut racer = Self::new(radio, address, settings);
      racer.connect().await?;
      let outcome = body(&mut racer).await;
      let closed = racer.disconnect().await;

      let value = outcome?;
      closed?;
      Ok(value)
   }

   pub const fn address(&self) -> Address {
      self.address
   }

   pub const fn vehicle(&self) -> &VehicleState {
      &self.vehicle
   }

   pub fn state(&self) -> LinkState {
      match &self.connection {
         None => LinkState::Disconnected,
         Some(Connection {
            characteristic: Some(_),
            ..
         }) => LinkState::Connected(HandleState::Cached),
         Some(_) => LinkState::Connected(HandleState::Unresolved),
      }
   }

   /// Opens a fresh link, tearing down any existing one first.
   pub async fn connect(&mut self) -> Result<()> {
      if self.connection.is_some() {
         debug!("Replacing existing link to {}", self.address);
         if let Err(e) = self.disconnect().await {
            warn!("Failed to close stale link to {}: {e}", self.address);
         }
      }

      // Connecting lasts only while this call holds the racer.
      info!("Connecting to racer {}", self.address);
      let connection = self.open_link().await?;
      if connection.characteristic.is_some() {
         info!("Connected to racer {}", self.address);
      } else {
         warn!(
            "Connected to {} but it has no control characteristic {CONTROL_CHARACTERISTIC}",
            self.address
         );
      }
      self.connection = Some(connection);
      Ok(())
   }

   async fn open_link(&mut self) -> Result<Connection<R::Link>> {
      let link = self.radio.connect(self.address, self.adapter_index).await?;
      let lookup = link.find_characteristics(CONTROL_CHARACTERISTIC).await;
      match lookup {
         Ok(found) => Ok(Connection {
            characteristic: found.into_iter().next(),
            link,
         }),
         Err(e) => {
            if let Err(close) = link.disconnect().await {
               debug!("Failed to close link after lookup error: {close}");
            }
            Err(e)
         },
      }
   }

   /// Closes the link if there is one. Safe to call when disconnected.
   pub async fn disconnect(&mut self) -> Result<()> {
      let Some(connection) = self.connection.take() else {
         return Ok(());
      };
      info!("Disconnecting from racer {}", self.address);
      connection.link.disconnect().await
   }

   async fn control_point(&mut self) -> Result<&CharacteristicOf<R>> {
      if !matches!(self.state(), LinkState::Connected(HandleState::Cached)) {
         self.connect().await?;
      }
      self
         .connection
         .as_ref()
         .and_then(|connection| connection.characteristic.as_ref())
         .ok_or(RacerError::CharacteristicUnresolved(self.address))
   }

   fn forget_characteristic(&mut self) {
      if let Some(connection) = self.connection.as_mut() {
         connection.characteristic = None;
      }
   }

   /// Writes one command, reconnecting and resending once if the link
   /// dropped and `allow_retry_once` is set.
   pub async fn send_raw(&mut self, command: Command, value: i32, allow_retry_once: bool) -> Result<()> {
      let payload = protocol::encode(command, value);
      let address = self.address;
      let mut attempts_left = if allow_retry_once { 2 } else { 1 };
      loop {
         attempts_left -= 1;
         let characteristic = self.control_point().await?;
         debug!(
            "Writing {} [{}] to {}",
            protocol::describe(&payload),
            hex::encode(payload),
            address
         );
         let outcome = characteristic.write(&payload).await;
         match outcome {
            Ok(()) => return Ok(()),
            Err(RacerError::LinkDisconnected) => {
               self.forget_characteristic();
               if attempts_left == 0 {
                  return Err(RacerError::LinkDisconnected);
               }
               warn!("Link to {address} dropped, reconnecting to resend {command}");
            },
            Err(e) => return Err(e),
         }
      }
   }

   /// Sends a signed displacement as an offset byte.
   pub async fn send_signed_offset(&mut self, command: Command, value: i32) -> Result<()> {
      self
         .send_raw(command, i32::from(protocol::signed_offset(value)), true)
         .await
   }

   pub async fn set_light(&mut self, on: bool) -> Result<()> {
      self
         .send_raw(Command::Light, i32::from(protocol::light_value(on)), true)
         .await
   }

   /// Sets the speed level, clamped to 1..=5.
   pub async fn set_speed(&mut self, level: i32) -> Result<()> {
      self
         .send_raw(Command::Speed, i32::from(protocol::speed_level(level)), true)
         .await
   }

   pub async fn set_turn(&mut self, direction: i32) -> Result<()> {
      self.send_signed_offset(Command::Turn, direction).await?;
      self.vehicle.direction = protocol::clamp_signed(direction);
      Ok(())
   }

   pub async fn set_motor(&mut self, rotation: i32) -> Result<()> {
      self.send_signed_offset(Command::Motor, rotation).await?;
      self.vehicle.rotation = protocol::clamp_signed(rotation);
      Ok(())
   }

   /// Centers the steering, halts the motor and switches the light off.
   pub async fn stop(&mut self) -> Result<()> {
      self.set_turn(0).await?;
      self.set_motor(0).await?;
      self.set_light(false).await
   }

   /// Commands motor and steering together, then waits one move interval.
   pub async fn drive_step(&mut self, rotation: i32, direction: i32) -> Result<()> {
      self.set_motor(rotation).await?;
      self.set_turn(direction).await?;
      time::sleep(self.vehicle.move_interval).await;
      Ok(())
   }

   /// Ramps towards the target over `steps` steps, then holds the target
   /// for whatever is left of `repeat`.
   pub async fn move_to(
      &mut self,
      target_rotation: i32,
      target_direction: i32,
      repeat: i32,
      steps: i32,
   ) -> Result<()> {
      let mut repeat = repeat;
      let mut steps = repeat.min(steps);
      while steps > 1 {
         let rotation = step_towards(self.vehicle.rotation, target_rotation, steps);
         let direction = step_towards(self.vehicle.direction, target_direction, steps);
         self.drive_step(rotation, direction).await?;
         steps -= 1;
         repeat -= 1;
      }
      while repeat > 0 {
         self.drive_step(target_rotation, target_direction).await?;
         repeat -= 1;
      }
      Ok(())
   }
}

/// Next value on the way from `current` to `target` with `steps` left.
///
/// Computed in `i64` so extreme targets cannot overflow; the result is
/// clamped to the signed command range.
fn step_towards(current: i32, target: i32, steps: i32) -> i32 {
   let delta = (i64::from(target) - i64::from(current)) / i64::from(steps);
   let next = (i64::from(current) + delta).clamp(
      i64::from(protocol::SIGNED_MIN),
      i64::from(protocol::SIGNED_MAX),
   );
   next as i32
}

impl<R: Radio> Drop for Racer<'_, R> {
   fn drop(&mut self) {
      if let Some(connection) = self.connection.take() {
         warn!("Racer {} dropped while connected, releasing link", self.address);
         connection.link.release();
      }
   }
}
