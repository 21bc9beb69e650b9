/*
 * Integration tests for perfboost
 *
 * These run the engine against a real directory tree standing in for sysfs,
 * from config file to control-node contents.
 */

use pb_core::{
    load_config, Engine, HintTranslator, ManualClock, PowerHint, PowerMode, Registry, SceneIds,
    SysfsWriter,
};
use serde_json::json;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Device {
    dir: TempDir,
    config: PathBuf,
}

impl Device {
    fn node(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.node(name)).unwrap()
    }
}

/// Fake device: one DDR floor node with a frequency table and a two-member GPU subsystem
fn device() -> Device {
    let dir = TempDir::new().unwrap();
    let p = |name: &str| dir.path().join(name).to_string_lossy().into_owned();

    for node in ["ddr_boost", "gpu_min", "gpu_max"] {
        fs::write(dir.path().join(node), "").unwrap();
    }
    fs::write(dir.path().join("freq_table"), "100 50 200 75\n").unwrap();
    fs::write(
        dir.path().join("scene_id.txt"),
        "0x00000001 0x00000000 launch\n0x00000007 0x00000000 game\n",
    )
    .unwrap();

    let config = json!({
        "scene_ids": p("scene_id.txt"),
        "resources": [
            {
                "name": "ddr",
                "raw": {
                    "path": p("ddr_boost"),
                    "encoding": "enable_tagged",
                    "freq_table": { "path": p("freq_table"), "size": 4 }
                }
            },
            {
                "name": "gpu",
                "subsystem": {
                    "members": [
                        { "path": p("gpu_min"), "default": "0" },
                        { "path": p("gpu_max"), "default": "0" }
                    ],
                    "configs": [
                        { "name": "game", "priority": 5, "sets": [
                            { "path": p("gpu_min"), "value": "400" },
                            { "path": p("gpu_max"), "value": "800" }
                        ] },
                        { "name": "idle", "priority": 1, "sets": [
                            { "path": p("gpu_max"), "value": "300" }
                        ] }
                    ]
                }
            }
        ],
        "scenes": [
            { "name": "launch", "actions": [ { "resource": "ddr", "value": "max" } ] },
            { "name": "interaction", "actions": [ { "resource": "ddr", "value": "min" } ] },
            { "name": "launch", "mode": "power_save", "actions": [ { "resource": "ddr", "value": "level:1" } ] }
        ]
    });
    let config_path = dir.path().join("perfboost.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    Device {
        dir,
        config: config_path,
    }
}

fn engine_for(device: &Device, clock: Arc<ManualClock>) -> Arc<Engine> {
    let config = load_config(&device.config).unwrap();
    let registry = Arc::new(Registry::from_config(&config).unwrap());
    Arc::new(Engine::new(registry, Arc::new(SysfsWriter)).with_clock(clock))
}

fn translator_for(device: &Device, engine: Arc<Engine>) -> HintTranslator {
    let config = load_config(&device.config).unwrap();
    let ids = SceneIds::load(config.scene_ids.as_deref().unwrap()).unwrap();
    HintTranslator::new(engine, ids, config.screen_off_ignore_charging)
}

#[test]
fn test_launch_outlasts_timed_interaction() {
    let device = device();
    let clock = Arc::new(ManualClock::new());
    let engine = engine_for(&device, clock.clone());
    let hints = translator_for(&device, engine.clone());

    assert!(hints.power_hint(PowerHint::Launch { active: true }));
    assert_eq!(device.read("ddr_boost"), "1 200");

    // Lower floor never displaces the launch boost
    assert!(!hints.power_hint(PowerHint::Interaction { data: Some(1000) }));
    assert_eq!(engine.current("ddr").as_deref(), Some("200"));

    assert!(hints.power_hint(PowerHint::Launch { active: false }));
    assert_eq!(device.read("ddr_boost"), "1 50");
    assert!(engine.armed_deadline("ddr").is_some());

    clock.advance_ms(1001);
    assert!(engine.on_deadline("ddr"));
    assert_eq!(device.read("ddr_boost"), "0 50");
    assert_eq!(engine.current("ddr"), None);
    assert!(engine.armed_deadline("ddr").is_none());
}

#[test]
fn test_subsystem_switch_demotes_members() {
    let device = device();
    let engine = engine_for(&device, Arc::new(ManualClock::new()));

    assert!(engine.submit_request("gpu", "game-app", true, 0, "game"));
    assert!(!engine.submit_request("gpu", "background", true, 0, "idle"));
    assert_eq!(device.read("gpu_min"), "400");
    assert_eq!(device.read("gpu_max"), "800");

    assert!(engine.submit_request("gpu", "game-app", false, 0, ""));
    assert_eq!(device.read("gpu_min"), "0");
    assert_eq!(device.read("gpu_max"), "300");
    assert_eq!(engine.current("gpu").as_deref(), Some("idle"));

    assert!(engine.submit_request("gpu", "background", false, 0, ""));
    assert_eq!(device.read("gpu_max"), "0");
    assert_eq!(engine.current("gpu"), None);
}

#[test]
fn test_power_mode_scene_overrides_normal() {
    let device = device();
    let engine = engine_for(&device, Arc::new(ManualClock::new()));
    let hints = translator_for(&device, engine.clone());

    hints.power_hint(PowerHint::Mode {
        mode: PowerMode::PowerSave,
        enable: true,
    });
    assert_eq!(hints.mode(), PowerMode::PowerSave);

    assert!(hints.power_hint(PowerHint::Launch { active: true }));
    assert_eq!(device.read("ddr_boost"), "1 75");
}

#[test]
fn test_disable_clears_everything() {
    let device = device();
    let engine = engine_for(&device, Arc::new(ManualClock::new()));
    let hints = translator_for(&device, engine.clone());

    engine.submit_request("ddr", "camera", true, 5000, "max");
    engine.submit_request("gpu", "game-app", true, 0, "game");
    assert_eq!(hints.get_scene_id("game"), 7);

    engine.set_engine_enabled(false);
    assert_eq!(device.read("ddr_boost"), "0 200");
    assert_eq!(device.read("gpu_min"), "0");
    assert_eq!(device.read("gpu_max"), "0");
    assert!(engine.armed_deadline("ddr").is_none());
    assert_eq!(hints.get_scene_id("game"), 0);

    // Requests are ignored until boosting is re-enabled
    assert!(!engine.submit_request("ddr", "camera", true, 0, "max"));
    engine.set_engine_enabled(true);
    assert!(engine.submit_request("ddr", "camera", true, 0, "max"));
}

#[test]
fn test_missing_frequency_table_rejects_selectors() {
    let device = device();
    fs::remove_file(device.node("freq_table")).unwrap();
    let engine = engine_for(&device, Arc::new(ManualClock::new()));

    assert!(!engine.submit_request("ddr", "camera", true, 0, "max"));
    assert_eq!(engine.current("ddr"), None);

    // Literal frequencies need no table
    assert!(engine.submit_request("ddr", "camera", true, 0, "933"));
    assert_eq!(device.read("ddr_boost"), "1 933");
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
#[serial]
fn test_dispatch_thread_expires_boost() {
    let device = device();
    let config = load_config(&device.config).unwrap();
    let registry = Arc::new(Registry::from_config(&config).unwrap());
    let engine = Arc::new(Engine::new(registry, Arc::new(SysfsWriter)));
    engine.start().unwrap();

    assert!(engine.submit_request("ddr", "touch", true, 50, "max"));
    assert_eq!(device.read("ddr_boost"), "1 200");

    assert!(wait_until(Duration::from_secs(2), || engine.current("ddr").is_none()));
    assert_eq!(device.read("ddr_boost"), "0 200");

    engine.stop();
    assert!(!engine.is_running());
}

#[test]
fn test_config_rejects_unknown_scene_resource() {
    let dir = TempDir::new().unwrap();
    let path: &Path = &dir.path().join("bad.json");
    fs::write(
        path,
        json!({
            "resources": [],
            "scenes": [ { "name": "launch", "actions": [ { "resource": "ddr", "value": "max" } ] } ]
        })
        .to_string(),
    )
    .unwrap();

    let config = load_config(path).unwrap();
    assert!(Registry::from_config(&config).is_err());
}
