//! Configuration loading
//!
//! Reads the JSON catalog and the scene-id definition file.

use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::constants::limits;
use crate::data::types::BoostConfig;
use crate::error::{BoostError, Result};

/// Load and deserialize the catalog at `path`
///
/// Structural validation happens later in `Registry::from_config`.
pub fn load_config(path: &Path) -> Result<BoostConfig> {
    validate_file_size(path)?;

    let contents = fs::read_to_string(path).map_err(|e| BoostError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: BoostConfig = serde_json::from_str(&contents)?;
    debug!(
        "Loaded {} resources and {} scenes from {:?}",
        config.resources.len(),
        config.scenes.len(),
        path
    );
    Ok(config)
}

fn validate_file_size(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|e| BoostError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > limits::MAX_CONFIG_SIZE {
        return Err(BoostError::config(format!(
            "config file exceeds maximum size of {} bytes",
            limits::MAX_CONFIG_SIZE
        )));
    }
    Ok(())
}

/// Scene name to numeric scene id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneIds {
    ids: HashMap<String, u32>,
}

impl SceneIds {
    /// Parse a definition file body
    ///
    /// Each meaningful line reads `0x<8 hex> 0x<8 hex> <scene name>`; the first field is
    /// the scene id. Other lines are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let pattern = Regex::new(r"^\s*0x([0-9A-Fa-f]{8})\s+0x[0-9A-Fa-f]{8}\s+(\S.*?)\s*$")
            .map_err(|e| BoostError::generic(e.to_string()))?;

        let mut ids = HashMap::new();
        for line in text.lines() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let Ok(id) = u32::from_str_radix(&caps[1], 16) else {
                continue;
            };
            let name = caps[2].to_string();
            if ids.insert(name.clone(), id).is_some() {
                warn!("Duplicate scene id definition for {}", name);
            }
        }
        Ok(Self { ids })
    }

    pub fn load(path: &Path) -> Result<Self> {
        validate_file_size(path)?;
        let text = fs::read_to_string(path).map_err(|e| BoostError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
