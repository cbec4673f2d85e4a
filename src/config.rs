//! Configuration management for the racer controller.
//!
//! This module handles loading and saving configuration from disk,
//! covering adapter selection, scan timing and motion pacing.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{RacerError, Result};

/// Main configuration structure for the controller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
   #[serde(default)]
   pub adapter_index: u32,

   #[serde(default = "default_scan_timeouts")]
   pub scan_timeouts_ms: Vec<u64>,

   #[serde(default)]
   pub passive_scan: bool,

   #[serde(default = "default_move_interval")]
   pub move_interval_ms: u64,

   #[serde(default = "default_connect_timeout")]
   pub connect_timeout_sec: u64,

   #[serde(default = "default_demo_speed")]
   pub demo_speed: i32,
}

fn default_scan_timeouts() -> Vec<u64> {
   vec![100, 300, 1000, 3000]
}

const fn default_move_interval() -> u64 {
   100
}

const fn default_connect_timeout() -> u64 {
   10
}

const fn default_demo_speed() -> i32 {
   5
}

impl Default for Config {
   fn default() -> Self {
      Self {
         adapter_index: 0,
         scan_timeouts_ms: default_scan_timeouts(),
         passive_scan: false,
         move_interval_ms: default_move_interval(),
         connect_timeout_sec: default_connect_timeout(),
         demo_speed: default_demo_speed(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   pub fn load_from(config_path: &Path) -> Result<Self> {
      if config_path.exists() {
         let contents = fs::read_to_string(config_path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(config_path)?;
         Ok(config)
      }
   }

   /// Saves the configuration to `config_path`, creating parent directories.
   pub fn save_to(&self, config_path: &Path) -> Result<()> {
      if let Some(parent) = config_path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(config_path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(racer_home) = env::var("PMRACER_HOME") {
         PathBuf::from(racer_home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Ok(home) = env::var("HOME") {
         PathBuf::from(home).join(".config")
      } else {
         dirs::config_dir().ok_or(RacerError::ConfigDirNotFound)?
      };

      Ok(config_dir.join("pmracer").join("config.toml"))
   }

   /// Escalating scan windows, shortest first.
   pub fn scan_timeouts(&self) -> Vec<Duration> {
      self
         .scan_timeouts_ms
         .iter()
         .map(|&ms| Duration::from_millis(ms))
         .collect()
   }

   pub const fn move_interval(&self) -> Duration {
      Duration::from_millis(self.move_interval_ms)
   }

   pub const fn connect_timeout(&self) -> Duration {
      Duration::from_secs(self.connect_timeout_sec)
   }
}
