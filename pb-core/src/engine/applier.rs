//! Atomic Configuration Applier
//!
//! Turns a winner change into control-node writes. Raw nodes take a single write (two
//! for enable-tagged nodes: withdraw the previous value, then assert the next one).
//! Subsystems fan a named config out across their member nodes, demoting members the
//! new config no longer sets before asserting the ones it does.
//!
//! Every function returns whether at least one write succeeded. I/O failures are logged
//! and never abort the remaining writes of a fan-out.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::constants::node::{TAG_DISABLE, TAG_ENABLE};
use crate::data::{NodeEncoding, RawNode, Subsystem};
use crate::error::{BoostError, Result};
use crate::hw::{write_member_value, NodeWriter};

/// Last value this engine wrote to each subsystem member, by member index
pub type MemberValues = HashMap<usize, String>;

fn write_logged(nodes: &dyn NodeWriter, resource: &str, path: &std::path::Path, value: &str) -> bool {
    match write_member_value(nodes, path, value) {
        Ok(count) => count > 0,
        Err(e) => {
            warn!(resource = %resource, "write failed: {}", e);
            false
        }
    }
}

/// Switch a raw node from `prev` to `next`
pub fn apply_raw(
    nodes: &dyn NodeWriter,
    resource: &str,
    node: &RawNode,
    prev: Option<&str>,
    next: &str,
) -> bool {
    if !nodes.exists(&node.path) {
        debug!(resource = %resource, "node {} absent, skipping write", node.path.display());
        return false;
    }

    match node.encoding {
        NodeEncoding::Plain => write_logged(nodes, resource, &node.path, next),
        NodeEncoding::EnableTagged => {
            let mut wrote = false;
            if let Some(prev) = prev {
                wrote |= write_logged(nodes, resource, &node.path, &format!("{} {}", TAG_DISABLE, prev));
            }
            wrote |= write_logged(nodes, resource, &node.path, &format!("{} {}", TAG_ENABLE, next));
            wrote
        }
    }
}

/// Return a raw node to idle after `prev` was the last applied value
pub fn clear_raw(nodes: &dyn NodeWriter, resource: &str, node: &RawNode, prev: &str) -> bool {
    if !nodes.exists(&node.path) {
        debug!(resource = %resource, "node {} absent, nothing to clear", node.path.display());
        return false;
    }

    match node.encoding {
        NodeEncoding::EnableTagged => {
            write_logged(nodes, resource, &node.path, &format!("{} {}", TAG_DISABLE, prev))
        }
        NodeEncoding::Plain => match &node.default {
            Some(default) => write_logged(nodes, resource, &node.path, default),
            None => false,
        },
    }
}

/// Apply the config matching `scene`
///
/// Fails with `UnknownScene` before touching any node when no config matches.
pub fn apply_subsystem(
    nodes: &dyn NodeWriter,
    resource: &str,
    subsystem: &Subsystem,
    values: &mut MemberValues,
    scene: &str,
) -> Result<bool> {
    let config = subsystem
        .resolve(scene)
        .ok_or_else(|| BoostError::UnknownScene {
            subsystem: resource.to_string(),
            scene: scene.to_string(),
        })?;

    let mut wrote = false;

    // Demote members left over from the previous config
    let stale: Vec<usize> = values
        .keys()
        .copied()
        .filter(|index| !config.targets.iter().any(|(i, _)| i == index))
        .collect();
    for index in stale {
        values.remove(&index);
        let member = &subsystem.members[index];
        let Some(default) = &member.default else {
            continue;
        };
        if nodes.exists(&member.path) {
            wrote |= write_logged(nodes, resource, &member.path, default);
        }
    }

    for (index, target) in &config.targets {
        let member = &subsystem.members[*index];
        let current = values.get(index).or(member.default.as_ref());
        if current == Some(target) {
            continue;
        }
        if !nodes.exists(&member.path) {
            debug!(resource = %resource, "member {} absent, skipping", member.path.display());
            continue;
        }
        wrote |= write_logged(nodes, resource, &member.path, target);
        values.insert(*index, target.clone());
    }

    debug!(resource = %resource, config = %config.name, "applied scene {}", scene);
    Ok(wrote)
}

/// Write every member's default
pub fn clear_subsystem(
    nodes: &dyn NodeWriter,
    resource: &str,
    subsystem: &Subsystem,
    values: &mut MemberValues,
) -> bool {
    values.clear();
    let mut wrote = false;
    for member in &subsystem.members {
        let Some(default) = &member.default else {
            continue;
        };
        if nodes.exists(&member.path) {
            wrote |= write_logged(nodes, resource, &member.path, default);
        }
    }
    wrote
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemberNode, SceneConfig};
    use crate::hw::{MemoryNodes, MockNodeWriter};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::path::{Path, PathBuf};

    fn raw(encoding: NodeEncoding, default: Option<&str>) -> RawNode {
        RawNode {
            path: PathBuf::from("/sys/ddr/boost"),
            encoding,
            default: default.map(str::to_string),
            freq_table: None,
        }
    }

    fn gpu() -> Subsystem {
        Subsystem {
            members: vec![
                MemberNode { path: PathBuf::from("/sys/gpu/min_freq"), default: Some("0".into()) },
                MemberNode { path: PathBuf::from("/sys/gpu/max_freq"), default: Some("900".into()) },
                MemberNode { path: PathBuf::from("/sys/gpu/load_overflow"), default: Some("0 0".into()) },
                MemberNode { path: PathBuf::from("/sys/gpu/missing"), default: Some("1".into()) },
            ],
            configs: vec![
                SceneConfig {
                    name: "game".into(),
                    priority: Some(2),
                    targets: vec![
                        (0, "600".into()),
                        (1, "900".into()),
                        (2, "10 20".into()),
                        (3, "5".into()),
                    ],
                },
                SceneConfig {
                    name: "video".into(),
                    priority: Some(1),
                    targets: vec![(1, "500".into())],
                },
            ],
        }
    }

    fn gpu_nodes() -> MemoryNodes {
        let nodes = MemoryNodes::new();
        nodes.add_node("/sys/gpu/min_freq");
        nodes.add_node("/sys/gpu/max_freq");
        nodes.add_node("/sys/gpu/load_overflow");
        nodes
    }

    #[test]
    fn test_enable_tagged_demotes_before_asserting() {
        let mut mock = MockNodeWriter::new();
        let mut seq = Sequence::new();
        let path = PathBuf::from("/sys/ddr/boost");
        mock.expect_exists().return_const(true);
        mock.expect_write()
            .with(eq(path.clone()), eq("0 933".to_string()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_write()
            .with(eq(path), eq("1 1866".to_string()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        assert!(apply_raw(&mock, "ddr", &raw(NodeEncoding::EnableTagged, None), Some("933"), "1866"));
    }

    #[test]
    fn test_plain_raw_single_write_and_default_on_clear() {
        let nodes = MemoryNodes::new();
        nodes.add_node("/sys/ddr/boost");
        let node = raw(NodeEncoding::Plain, Some("0"));

        assert!(apply_raw(&nodes, "ddr", &node, Some("933"), "1866"));
        assert!(clear_raw(&nodes, "ddr", &node, "1866"));
        assert_eq!(nodes.writes_to(Path::new("/sys/ddr/boost")), vec!["1866", "0"]);

        let no_default = raw(NodeEncoding::Plain, None);
        nodes.clear_writes();
        assert!(!clear_raw(&nodes, "ddr", &no_default, "1866"));
        assert!(nodes.writes().is_empty());
    }

    #[test]
    fn test_absent_raw_node_skips_writes() {
        let nodes = MemoryNodes::new();
        let node = raw(NodeEncoding::EnableTagged, None);
        assert!(!apply_raw(&nodes, "ddr", &node, None, "933"));
        assert!(!clear_raw(&nodes, "ddr", &node, "933"));
        assert!(nodes.writes().is_empty());
    }

    #[test]
    fn test_failed_write_reports_no_write() {
        let nodes = MemoryNodes::new();
        nodes.add_node("/sys/ddr/boost");
        nodes.fail_writes("/sys/ddr/boost");
        assert!(!apply_raw(&nodes, "ddr", &raw(NodeEncoding::Plain, None), None, "933"));
    }

    #[test]
    fn test_subsystem_fan_out() {
        let nodes = gpu_nodes();
        let mut values = MemberValues::new();

        assert!(apply_subsystem(&nodes, "gpu", &gpu(), &mut values, "game:3").unwrap());
        // max_freq already at its default, missing member skipped
        assert_eq!(
            nodes.writes(),
            vec![
                (PathBuf::from("/sys/gpu/min_freq"), "600".to_string()),
                (PathBuf::from("/sys/gpu/load_overflow"), "0 10".to_string()),
                (PathBuf::from("/sys/gpu/load_overflow"), "1 20".to_string()),
            ]
        );
        assert_eq!(values.get(&0).map(String::as_str), Some("600"));
        assert!(!values.contains_key(&3));
    }

    #[test]
    fn test_subsystem_switch_demotes_stale_members() {
        let nodes = gpu_nodes();
        let mut values = MemberValues::new();
        apply_subsystem(&nodes, "gpu", &gpu(), &mut values, "game").unwrap();
        nodes.clear_writes();

        assert!(apply_subsystem(&nodes, "gpu", &gpu(), &mut values, "video").unwrap());
        let writes = nodes.writes();
        let assert_at = writes
            .iter()
            .position(|(p, v)| p == Path::new("/sys/gpu/max_freq") && v == "500")
            .unwrap();
        // Every demotion lands before the assertion
        assert!(writes[..assert_at].contains(&(PathBuf::from("/sys/gpu/min_freq"), "0".to_string())));
        assert!(writes[..assert_at].contains(&(PathBuf::from("/sys/gpu/load_overflow"), "0 0".to_string())));
        assert_eq!(assert_at, writes.len() - 1);
    }

    #[test]
    fn test_unknown_scene_writes_nothing() {
        let nodes = gpu_nodes();
        let mut values = MemberValues::new();
        let err = apply_subsystem(&nodes, "gpu", &gpu(), &mut values, "camera").unwrap_err();
        assert!(matches!(err, BoostError::UnknownScene { .. }));
        assert!(nodes.writes().is_empty());
    }

    #[test]
    fn test_clear_subsystem_writes_all_defaults() {
        let nodes = gpu_nodes();
        let mut values = MemberValues::new();
        apply_subsystem(&nodes, "gpu", &gpu(), &mut values, "game").unwrap();
        nodes.clear_writes();

        assert!(clear_subsystem(&nodes, "gpu", &gpu(), &mut values));
        assert!(values.is_empty());
        assert_eq!(
            nodes.writes(),
            vec![
                (PathBuf::from("/sys/gpu/min_freq"), "0".to_string()),
                (PathBuf::from("/sys/gpu/max_freq"), "900".to_string()),
                (PathBuf::from("/sys/gpu/load_overflow"), "0 0".to_string()),
                (PathBuf::from("/sys/gpu/load_overflow"), "1 0".to_string()),
            ]
        );
    }
}
