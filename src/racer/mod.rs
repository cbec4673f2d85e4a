//! Playmobil racer protocol and control.
//!
//! This module contains the racer-specific functionality: recognition of
//! advertisements, the command wire format, and the connection controller.

pub mod controller;
pub mod device;
pub mod protocol;
pub mod recognition;
