//! Racer protocol definitions.
//!
//! Every command is a single 3-byte write to the control characteristic:
//! `[command, value, TERMINATOR]`.

use uuid::Uuid;

/// Control characteristic every command is written to.
pub const CONTROL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x06d1e5e7_79ad_4a71_8faa_373789f7d93c);

/// Advertised local name prefix of every racer.
pub const NAME_PREFIX: &str = "PM-RC ";

/// Trailing byte of every command payload.
pub const TERMINATOR: u8 = 0x0F;

pub const LIGHT_ON: u8 = 0x02;
pub const LIGHT_OFF: u8 = 0x01;

pub const SPEED_MIN: i32 = 1;
pub const SPEED_MAX: i32 = 5;

/// Signed displacement range accepted by motor and turn commands.
pub const SIGNED_MIN: i32 = -127;
pub const SIGNED_MAX: i32 = 128;
const SIGNED_OFFSET: i32 = 127;

pub type Payload = [u8; 3];

/// Command bytes understood by the racer.
#[repr(u8)]
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   strum::FromRepr,
   strum::Display,
)]
pub enum Command {
   #[strum(serialize = "motor")]
   Motor = 0x23,
   #[strum(serialize = "light")]
   Light = 0x24,
   #[strum(serialize = "speed")]
   Speed = 0x25,
   #[strum(serialize = "turn")]
   Turn = 0x40,
}

impl Command {
   pub const fn byte(self) -> u8 {
      self as u8
   }
}

/// Builds the wire payload, saturating `value` into a byte.
pub fn encode(command: Command, value: i32) -> Payload {
   [command.byte(), value.clamp(0, 255) as u8, TERMINATOR]
}

/// Parses a payload previously produced by [`encode`].
pub fn decode(payload: &[u8]) -> Option<(Command, u8)> {
   match *payload {
      [command, value, TERMINATOR] => Some((Command::from_repr(command)?, value)),
      _ => None,
   }
}

/// Renders a payload for logs, e.g. `turn -2` or `light 2`.
pub fn describe(payload: &[u8]) -> String {
   match decode(payload) {
      Some((command @ (Command::Motor | Command::Turn), value)) => {
         format!("{command} {}", from_signed_offset(value))
      },
      Some((command, value)) => format!("{command} {value}"),
      None => format!("unknown {}", hex::encode(payload)),
   }
}

/// Maps a signed displacement onto the unsigned byte the racer expects.
pub const fn signed_offset(value: i32) -> u8 {
   let clamped = clamp_signed(value);
   (clamped + SIGNED_OFFSET) as u8
}

/// Inverse of [`signed_offset`].
pub const fn from_signed_offset(byte: u8) -> i32 {
   byte as i32 - SIGNED_OFFSET
}

pub const fn clamp_signed(value: i32) -> i32 {
   if value < SIGNED_MIN {
      SIGNED_MIN
   } else if value > SIGNED_MAX {
      SIGNED_MAX
   } else {
      value
   }
}

pub fn speed_level(level: i32) -> u8 {
   level.clamp(SPEED_MIN, SPEED_MAX) as u8
}

pub const fn light_value(on: bool) -> u8 {
   if on { LIGHT_ON } else { LIGHT_OFF }
}
