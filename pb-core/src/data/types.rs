//! Configuration file types
//!
//! Serde shapes of the JSON catalog. They are validated and frozen into a
//! [`Registry`](crate::data::Registry) before the engine sees them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub scenes: Vec<SceneEntry>,
    /// Scene-id definition file consulted by `get_scene_id`
    #[serde(default)]
    pub scene_ids: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub boost_enabled: bool,
    /// Keep the screen-off scene asserted while charging
    #[serde(default)]
    pub screen_off_ignore_charging: bool,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            scenes: Vec::new(),
            scene_ids: None,
            boost_enabled: true,
            screen_off_ignore_charging: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One control resource; exactly one of `raw` / `subsystem` must be set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<SubsystemEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeEncoding {
    /// Plain decimal overwrite
    #[default]
    Plain,
    /// `"1 <value>"` to assert, `"0 <value>"` to withdraw
    EnableTagged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub encoding: NodeEncoding,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub freq_table: Option<FreqTableEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreqTableEntry {
    #[serde(default = "default_table_path")]
    pub path: PathBuf,
    #[serde(default = "default_table_size")]
    pub size: usize,
}

fn default_table_path() -> PathBuf {
    PathBuf::from(crate::constants::paths::DDR_FREQ_TABLE)
}

fn default_table_size() -> usize {
    crate::constants::freq::TABLE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemEntry {
    pub members: Vec<MemberEntry>,
    #[serde(default)]
    pub configs: Vec<ConfigEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub sets: Vec<TargetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub path: PathBuf,
    pub value: String,
}

/// Power mode a hint scene belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    #[default]
    Normal,
    LowPower,
    PowerSave,
    UltraPowerSave,
    Performance,
}

impl PowerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerMode::Normal => "normal",
            PowerMode::LowPower => "low_power",
            PowerMode::PowerSave => "power_save",
            PowerMode::UltraPowerSave => "ultra_power_save",
            PowerMode::Performance => "performance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(PowerMode::Normal),
            "low_power" => Some(PowerMode::LowPower),
            "power_save" => Some(PowerMode::PowerSave),
            "ultra_power_save" => Some(PowerMode::UltraPowerSave),
            "performance" => Some(PowerMode::Performance),
            _ => None,
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power-hint scene: a named bundle of resource requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    pub name: String,
    #[serde(default)]
    pub mode: PowerMode,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub resource: String,
    pub value: String,
}
