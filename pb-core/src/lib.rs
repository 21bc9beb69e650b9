//! Perfboost Core Library
//!
//! Arbitrates competing boost requests for SoC operating-point resources (DRAM
//! frequency floors, subsystem scaling knobs) and applies the winning value to the
//! kernel control nodes.
//!
//! # Module Structure
//!
//! - `hw/` - Control-node I/O and frequency table bootstrap
//! - `data/` - Config file types, loading, and the resource registry
//! - `engine/` - Request arbitration, configuration applier, expiry dispatch
//! - `hint` - Power-hint translation on top of the engine
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pb_core::{load_config, Engine, Registry, SysfsWriter};
//!
//! let config = load_config(std::path::Path::new("/etc/perfboost/perfboost.json")).unwrap();
//! let registry = Arc::new(Registry::from_config(&config).unwrap());
//! let engine = Arc::new(Engine::new(registry, Arc::new(SysfsWriter)));
//! engine.start().unwrap();
//! engine.submit_request("ddr", "app-launch", true, 0, "max");
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod clock;
pub mod constants;
pub mod hint;

pub use pb_error as error;

// Re-export error types
pub use error::{BoostError, Result};

pub use clock::{Clock, ManualClock, MonotonicClock};

pub use data::{
    load_config, BoostConfig, ControlResource, HintScene, NodeEncoding, PowerMode, RawNode,
    Registry, ResourceKind, SceneConfig, SceneIds, Subsystem,
};

pub use engine::{
    DefaultPriorityPolicy, Engine, PriorityPolicy, RequestSnapshot, ResourceSnapshot,
};

pub use hint::{HintTranslator, PowerHint};

pub use hw::{FreqSelector, FrequencyTable, MemoryNodes, NodeWriter, SysfsWriter};
