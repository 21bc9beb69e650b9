//! Catalog types, configuration loading, and the resource registry

mod config;
mod registry;
mod types;

pub use config::{load_config, SceneIds};
pub use registry::{
    scene_key, scene_suffix, ControlResource, HintScene, MemberNode, RawNode, Registry,
    ResourceKind, SceneConfig, Subsystem,
};
pub use types::{
    ActionEntry, BoostConfig, ConfigEntry, FreqTableEntry, MemberEntry, NodeEncoding, PowerMode,
    RawEntry, ResourceEntry, SceneEntry, SubsystemEntry, TargetEntry,
};
