//! Resource Registry
//!
//! Immutable catalog of control resources and power-hint scenes, validated once at
//! startup and shared with the engine through `Arc`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::constants::limits;
use crate::constants::node::SCENE_SUFFIX_SEPARATOR;
use crate::data::types::{
    ActionEntry, BoostConfig, FreqTableEntry, NodeEncoding, PowerMode, ResourceEntry,
    SubsystemEntry,
};
use crate::error::{BoostError, Result};

/// A named hardware knob
#[derive(Debug, Clone)]
pub struct ControlResource {
    pub name: String,
    pub kind: ResourceKind,
}

/// Exactly one shape per resource
#[derive(Debug, Clone)]
pub enum ResourceKind {
    Raw(RawNode),
    Subsystem(Subsystem),
}

/// Single filesystem-backed write target
#[derive(Debug, Clone)]
pub struct RawNode {
    pub path: PathBuf,
    pub encoding: NodeEncoding,
    /// Written on clear for plain nodes
    pub default: Option<String>,
    pub freq_table: Option<FreqTableEntry>,
}

/// Subsystem node group with named scene configs
#[derive(Debug, Clone)]
pub struct Subsystem {
    pub members: Vec<MemberNode>,
    pub configs: Vec<SceneConfig>,
}

#[derive(Debug, Clone)]
pub struct MemberNode {
    pub path: PathBuf,
    pub default: Option<String>,
}

/// Named set of (member, target) pairs applied together
#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub name: String,
    pub priority: Option<u32>,
    /// Member index and target value
    pub targets: Vec<(usize, String)>,
}

impl Subsystem {
    /// Find the config for a scene string, matching the part before `:`
    pub fn resolve(&self, scene: &str) -> Option<&SceneConfig> {
        let key = scene_key(scene);
        self.configs.iter().find(|c| c.name == key)
    }
}

/// Scene name without its `:<extra>` suffix
pub fn scene_key(scene: &str) -> &str {
    scene
        .split_once(SCENE_SUFFIX_SEPARATOR)
        .map_or(scene, |(name, _)| name)
}

/// Suffix data after `:`, if any
pub fn scene_suffix(scene: &str) -> Option<&str> {
    scene.split_once(SCENE_SUFFIX_SEPARATOR).map(|(_, extra)| extra)
}

/// Power-hint scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintScene {
    pub name: String,
    pub mode: PowerMode,
    pub actions: Vec<ActionEntry>,
}

/// Frozen catalog
#[derive(Debug, Default)]
pub struct Registry {
    resources: Vec<ControlResource>,
    index: HashMap<String, usize>,
    scenes: HashMap<(PowerMode, String), HintScene>,
}

impl Registry {
    /// Validate a parsed config and freeze it
    pub fn from_config(config: &BoostConfig) -> Result<Self> {
        if config.resources.len() > limits::MAX_RESOURCES {
            return Err(BoostError::invalid_config(
                "resources",
                format!("more than {} resources", limits::MAX_RESOURCES),
            ));
        }

        let mut registry = Registry::default();
        for entry in &config.resources {
            let resource = build_resource(entry)?;
            if registry.index.contains_key(&resource.name) {
                return Err(BoostError::invalid_config(
                    "resources",
                    format!("duplicate resource {:?}", resource.name),
                ));
            }
            registry
                .index
                .insert(resource.name.clone(), registry.resources.len());
            registry.resources.push(resource);
        }

        for scene in &config.scenes {
            validate_name("scenes", &scene.name)?;
            for action in &scene.actions {
                if !registry.index.contains_key(&action.resource) {
                    return Err(BoostError::invalid_config(
                        "scenes",
                        format!("scene {:?} targets unknown resource {:?}", scene.name, action.resource),
                    ));
                }
            }
            let key = (scene.mode, scene.name.clone());
            if registry.scenes.contains_key(&key) {
                return Err(BoostError::invalid_config(
                    "scenes",
                    format!("duplicate scene {:?} in mode {}", scene.name, scene.mode),
                ));
            }
            registry.scenes.insert(
                key,
                HintScene {
                    name: scene.name.clone(),
                    mode: scene.mode,
                    actions: scene.actions.clone(),
                },
            );
        }

        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&ControlResource> {
        self.index.get(name).map(|&i| &self.resources[i])
    }

    pub fn resources(&self) -> impl Iterator<Item = &ControlResource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Scene lookup in `mode`, falling back to the normal-mode scene
    pub fn scene(&self, mode: PowerMode, name: &str) -> Option<&HintScene> {
        self.scenes
            .get(&(mode, name.to_string()))
            .or_else(|| self.scenes.get(&(PowerMode::Normal, name.to_string())))
    }
}

fn validate_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BoostError::invalid_config(field, "empty name"));
    }
    if name.len() > limits::MAX_NAME_LENGTH {
        return Err(BoostError::invalid_config(
            field,
            format!("name longer than {} bytes", limits::MAX_NAME_LENGTH),
        ));
    }
    Ok(())
}

fn build_resource(entry: &ResourceEntry) -> Result<ControlResource> {
    validate_name("resources", &entry.name)?;
    let field = format!("resources.{}", entry.name);

    let kind = match (&entry.raw, &entry.subsystem) {
        (Some(raw), None) => {
            if raw.path.as_os_str().is_empty() {
                return Err(BoostError::invalid_config(&field, "raw node has an empty path"));
            }
            if let Some(table) = &raw.freq_table {
                if table.size == 0 || table.size > limits::MAX_TABLE_SIZE {
                    return Err(BoostError::invalid_config(
                        &field,
                        format!("frequency table size must be 1..={}", limits::MAX_TABLE_SIZE),
                    ));
                }
            }
            ResourceKind::Raw(RawNode {
                path: raw.path.clone(),
                encoding: raw.encoding,
                default: raw.default.clone(),
                freq_table: raw.freq_table.clone(),
            })
        }
        (None, Some(subsystem)) => ResourceKind::Subsystem(build_subsystem(&field, subsystem)?),
        (Some(_), Some(_)) => {
            return Err(BoostError::invalid_config(&field, "declares both raw and subsystem"));
        }
        (None, None) => {
            return Err(BoostError::invalid_config(&field, "declares neither raw nor subsystem"));
        }
    };

    Ok(ControlResource {
        name: entry.name.clone(),
        kind,
    })
}

fn build_subsystem(field: &str, entry: &SubsystemEntry) -> Result<Subsystem> {
    if entry.members.is_empty() {
        return Err(BoostError::invalid_config(field, "subsystem has no members"));
    }

    let mut member_index = HashMap::new();
    let mut members = Vec::with_capacity(entry.members.len());
    for member in &entry.members {
        if member_index.insert(member.path.clone(), members.len()).is_some() {
            return Err(BoostError::invalid_config(
                field,
                format!("duplicate member {}", member.path.display()),
            ));
        }
        members.push(MemberNode {
            path: member.path.clone(),
            default: member.default.clone(),
        });
    }

    let mut names = HashSet::new();
    let mut configs = Vec::with_capacity(entry.configs.len());
    for config in &entry.configs {
        validate_name(field, &config.name)?;
        if config.name.contains(SCENE_SUFFIX_SEPARATOR) {
            return Err(BoostError::invalid_config(
                field,
                format!("config name {:?} contains '{}'", config.name, SCENE_SUFFIX_SEPARATOR),
            ));
        }
        if !names.insert(config.name.as_str()) {
            return Err(BoostError::invalid_config(
                field,
                format!("duplicate config {:?}", config.name),
            ));
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(config.sets.len());
        for target in &config.sets {
            let Some(&index) = member_index.get(&target.path) else {
                return Err(BoostError::invalid_config(
                    field,
                    format!("config {:?} sets undeclared member {}", config.name, target.path.display()),
                ));
            };
            if !seen.insert(index) {
                return Err(BoostError::invalid_config(
                    field,
                    format!("config {:?} sets {} twice", config.name, target.path.display()),
                ));
            }
            targets.push((index, target.value.clone()));
        }

        configs.push(SceneConfig {
            name: config.name.clone(),
            priority: config.priority,
            targets,
        });
    }

    Ok(Subsystem { members, configs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> BoostConfig {
        serde_json::from_value(value).unwrap()
    }

    fn sample() -> BoostConfig {
        config(json!({
            "resources": [
                { "name": "ddr", "raw": { "path": "/sys/ddr/boost", "encoding": "enable_tagged" } },
                { "name": "gpu", "subsystem": {
                    "members": [
                        { "path": "/sys/gpu/min_freq", "default": "0" },
                        { "path": "/sys/gpu/overflow", "default": "0 0" }
                    ],
                    "configs": [
                        { "name": "game", "priority": 3, "sets": [
                            { "path": "/sys/gpu/min_freq", "value": "600" }
                        ] }
                    ]
                } }
            ],
            "scenes": [
                { "name": "launch", "actions": [ { "resource": "ddr", "value": "max" } ] },
                { "name": "launch", "mode": "power_save", "actions": [] }
            ]
        }))
    }

    #[test]
    fn test_from_config_builds_catalog() {
        let registry = Registry::from_config(&sample()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(matches!(registry.get("ddr").unwrap().kind, ResourceKind::Raw(_)));
        let ResourceKind::Subsystem(gpu) = &registry.get("gpu").unwrap().kind else {
            panic!("gpu should be a subsystem");
        };
        assert_eq!(gpu.configs[0].targets, vec![(0, "600".to_string())]);
        assert!(registry.get("cpu").is_none());
    }

    #[test]
    fn test_scene_lookup_falls_back_to_normal() {
        let registry = Registry::from_config(&sample()).unwrap();
        let saving = registry.scene(PowerMode::PowerSave, "launch").unwrap();
        assert!(saving.actions.is_empty());
        let perf = registry.scene(PowerMode::Performance, "launch").unwrap();
        assert_eq!(perf.mode, PowerMode::Normal);
        assert!(registry.scene(PowerMode::Normal, "vsync").is_none());
    }

    #[test]
    fn test_resource_must_have_exactly_one_shape() {
        let both = config(json!({ "resources": [ {
            "name": "x",
            "raw": { "path": "/a" },
            "subsystem": { "members": [ { "path": "/b" } ] }
        } ] }));
        assert!(matches!(
            Registry::from_config(&both),
            Err(BoostError::InvalidConfig { .. })
        ));

        let neither = config(json!({ "resources": [ { "name": "x" } ] }));
        assert!(Registry::from_config(&neither).is_err());
    }

    #[test]
    fn test_config_must_target_declared_members() {
        let bad = config(json!({ "resources": [ { "name": "gpu", "subsystem": {
            "members": [ { "path": "/sys/gpu/min_freq" } ],
            "configs": [ { "name": "game", "sets": [ { "path": "/sys/gpu/other", "value": "1" } ] } ]
        } } ] }));
        assert!(Registry::from_config(&bad).is_err());
    }

    #[test]
    fn test_scene_must_target_known_resource() {
        let bad = config(json!({
            "resources": [],
            "scenes": [ { "name": "launch", "actions": [ { "resource": "ddr", "value": "max" } ] } ]
        }));
        assert!(Registry::from_config(&bad).is_err());
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let bad = config(json!({ "resources": [
            { "name": "ddr", "raw": { "path": "/a" } },
            { "name": "ddr", "raw": { "path": "/b" } }
        ] }));
        assert!(Registry::from_config(&bad).is_err());
    }

    #[test]
    fn test_resolve_matches_up_to_separator() {
        let registry = Registry::from_config(&sample()).unwrap();
        let ResourceKind::Subsystem(gpu) = &registry.get("gpu").unwrap().kind else {
            panic!("gpu should be a subsystem");
        };
        assert_eq!(gpu.resolve("game").unwrap().name, "game");
        assert_eq!(gpu.resolve("game:7").unwrap().name, "game");
        assert!(gpu.resolve("Game").is_none());
        assert!(gpu.resolve("gamer").is_none());
        assert_eq!(scene_suffix("game:7"), Some("7"));
        assert_eq!(scene_suffix("game"), None);
    }
}
