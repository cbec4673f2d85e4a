//! Bluetooth layer for racer discovery and GATT access.
//!
//! This module provides the radio abstraction, its BlueZ implementation,
//! and the scanner that finds racers through it.

pub mod bluez;
#[cfg(test)]
pub mod fixture;
pub mod radio;
pub mod scanner;
