//! Power-hint translation
//!
//! Tracks interactive, charging and power-mode state and turns power hints into
//! `submit_request` calls. Every action of a scene is submitted with the scene name as
//! the requester token, so re-asserting a scene replaces its earlier requests.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::boost::{DURATION_DEFAULT_MS, DURATION_MAX_MS, SCENE_SWAP_DELAY_MS};
use crate::constants::scenes;
use crate::data::{PowerMode, SceneIds};
use crate::engine::Engine;

/// Hints accepted from callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerHint {
    /// Touch or scroll; the low 16 bits of `data` carry the duration
    Interaction { data: Option<i32> },
    /// App launch started (`true`) or finished
    Launch { active: bool },
    /// 1 = encoding started, 0 = stopped
    VideoEncode { state: i32 },
    /// Enter `mode`, or leave it back to normal
    Mode { mode: PowerMode, enable: bool },
    /// Any other configured scene; `None` releases it
    Custom { scene: String, data: Option<i32> },
}

#[derive(Debug)]
struct HintState {
    interactive: bool,
    launching: bool,
    charging: bool,
    mode: PowerMode,
    /// Screen-off scene asserted in normal mode
    screen_off_applied: bool,
}

pub struct HintTranslator {
    engine: Arc<Engine>,
    scene_ids: SceneIds,
    ignore_charging: bool,
    state: Mutex<HintState>,
}

impl HintTranslator {
    pub fn new(engine: Arc<Engine>, scene_ids: SceneIds, ignore_charging: bool) -> Self {
        Self {
            engine,
            scene_ids,
            ignore_charging,
            state: Mutex::new(HintState {
                interactive: true,
                launching: false,
                charging: false,
                mode: PowerMode::Normal,
                screen_off_applied: false,
            }),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn mode(&self) -> PowerMode {
        self.state.lock().mode
    }

    pub fn is_interactive(&self) -> bool {
        self.state.lock().interactive
    }

    /// Returns whether any hardware write happened
    pub fn power_hint(&self, hint: PowerHint) -> bool {
        if !self.engine.is_enabled() {
            return false;
        }
        let mut state = self.state.lock();
        debug!("power hint {:?}", hint);

        match hint {
            PowerHint::Interaction { data } => {
                let duration = clamp_duration(data.map_or(0, |d| d & 0xffff));
                self.boost(&state, scenes::INTERACTION, true, duration)
            }
            PowerHint::Launch { active } => {
                if active && !state.interactive {
                    debug!("screen off, ignoring launch boost");
                    return false;
                }
                if state.launching == active {
                    return false;
                }
                state.launching = active;
                self.boost(&state, scenes::LAUNCH, active, 0)
            }
            PowerHint::VideoEncode { state: encode } => match encode & 0xffff {
                1 => self.boost(&state, scenes::VIDEO_ENCODE, true, 0),
                0 => self.boost(&state, scenes::VIDEO_ENCODE, false, 0),
                _ => false,
            },
            PowerHint::Mode { mode, enable } => self.switch_mode(&mut state, mode, enable),
            PowerHint::Custom { scene, data } => match data {
                None => self.boost(&state, &scene, false, 0),
                Some(d) if d < 0 => false,
                Some(d) => {
                    let duration = match d & 0xffff {
                        0 | 1 => 0,
                        masked => clamp_duration(masked),
                    };
                    self.boost(&state, &scene, true, duration)
                }
            },
        }
    }

    /// Screen on/off transition
    pub fn set_interactive(&self, on: bool) -> bool {
        let mut state = self.state.lock();
        if state.interactive == on {
            return false;
        }
        state.interactive = on;
        info!("Interactive state: {}", if on { "on" } else { "off" });

        if state.mode == PowerMode::Normal {
            let pulse = if on { scenes::SCREEN_ON_PULSE } else { scenes::SCREEN_OFF_PULSE };
            let mut wrote = self.boost(&state, pulse, true, DURATION_DEFAULT_MS);

            if on && state.screen_off_applied {
                wrote |= self.boost(&state, scenes::SCREEN_OFF, false, 0);
                state.screen_off_applied = false;
            } else if !on && (self.ignore_charging || !state.charging) {
                wrote |= self.boost(&state, scenes::SCREEN_OFF, true, 0);
                state.screen_off_applied = true;
            }
            return wrote;
        }

        let (release, assert) = if on {
            (scenes::SCREEN_OFF, scenes::SCREEN_ON)
        } else {
            (scenes::SCREEN_ON, scenes::SCREEN_OFF)
        };
        let mut wrote = self.boost(&state, release, false, 0);
        thread::sleep(Duration::from_millis(SCENE_SWAP_DELAY_MS));
        wrote |= self.boost(&state, assert, true, 0);
        wrote
    }

    pub fn set_charging(&self, charging: bool) {
        self.state.lock().charging = charging;
    }

    /// Numeric id of a named scene, 0 when unknown or boosting is disabled
    pub fn get_scene_id(&self, name: &str) -> u32 {
        if !self.engine.is_enabled() {
            return 0;
        }
        self.scene_ids.get(name).unwrap_or(0)
    }

    fn switch_mode(&self, state: &mut HintState, mode: PowerMode, enable: bool) -> bool {
        if (state.mode == mode && enable) || (state.mode != mode && !enable) {
            return false;
        }
        let next = if enable { mode } else { PowerMode::Normal };
        if next == state.mode {
            return false;
        }
        info!("Power mode {} -> {}", state.mode, next);

        // Withdraw the outgoing mode's screen scenes while lookups still resolve in it
        let mut wrote = self.boost(state, scenes::SCREEN_ON, false, 0);
        wrote |= self.boost(state, scenes::SCREEN_OFF, false, 0);
        state.screen_off_applied = false;
        state.mode = next;

        if state.interactive {
            wrote |= self.boost(state, scenes::SCREEN_ON, true, 0);
        } else if next != PowerMode::Normal {
            wrote |= self.boost(state, scenes::SCREEN_OFF, true, 0);
        } else if self.ignore_charging || !state.charging {
            state.screen_off_applied = true;
            wrote |= self.boost(state, scenes::SCREEN_OFF, true, 0);
        }
        wrote
    }

    /// Submit every action of a scene
    fn boost(&self, state: &HintState, scene: &str, enable: bool, duration_ms: u32) -> bool {
        let registry = self.engine.registry();
        let Some(entry) = registry.scene(state.mode, scene) else {
            debug!("no scene {} for mode {}", scene, state.mode);
            return false;
        };

        let mut wrote = false;
        for action in &entry.actions {
            wrote |= self
                .engine
                .submit_request(&action.resource, &entry.name, enable, duration_ms, &action.value);
        }
        wrote
    }
}

fn clamp_duration(duration: i32) -> u32 {
    match u32::try_from(duration) {
        Ok(d) if (DURATION_DEFAULT_MS..=DURATION_MAX_MS).contains(&d) => d,
        _ => DURATION_DEFAULT_MS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data::{BoostConfig, Registry};
    use crate::hw::MemoryNodes;
    use serde_json::json;

    fn translator(ignore_charging: bool) -> HintTranslator {
        let config: BoostConfig = serde_json::from_value(json!({
            "resources": [
                { "name": "ddr", "raw": { "path": "/sys/ddr" } },
                { "name": "cap", "raw": { "path": "/sys/cap", "default": "0" } }
            ],
            "scenes": [
                { "name": "interaction", "actions": [ { "resource": "ddr", "value": "800" } ] },
                { "name": "launch", "actions": [ { "resource": "ddr", "value": "1600" } ] },
                { "name": "video_encode", "actions": [ { "resource": "ddr", "value": "1200" } ] },
                { "name": "screen_on_pulse", "actions": [ { "resource": "ddr", "value": "1000" } ] },
                { "name": "screen_off_pulse", "actions": [ { "resource": "ddr", "value": "400" } ] },
                { "name": "screen_off", "actions": [ { "resource": "cap", "value": "600" } ] },
                { "name": "screen_on", "mode": "power_save", "actions": [ { "resource": "cap", "value": "1200" } ] },
                { "name": "screen_off", "mode": "power_save", "actions": [ { "resource": "cap", "value": "300" } ] },
                { "name": "camera", "actions": [ { "resource": "ddr", "value": "1400" } ] }
            ]
        }))
        .unwrap();
        let registry = Arc::new(Registry::from_config(&config).unwrap());
        let nodes = Arc::new(MemoryNodes::new());
        nodes.add_node("/sys/ddr");
        nodes.add_node("/sys/cap");
        let engine = Engine::new(registry, nodes).with_clock(Arc::new(ManualClock::new()));
        let ids = SceneIds::parse("0x00000007 0x00000000 camera\n").unwrap();
        HintTranslator::new(Arc::new(engine), ids, ignore_charging)
    }

    fn remaining(t: &HintTranslator, requester: &str) -> Option<Option<u64>> {
        t.engine()
            .snapshot()
            .into_iter()
            .flat_map(|r| r.requests)
            .find(|r| r.requester == requester)
            .map(|r| r.remaining_ms)
    }

    #[test]
    fn test_interaction_duration_clamped() {
        let t = translator(false);
        let cases = [(Some(100), 500), (Some(2000), 2000), (Some(0x2_0000 | 3000), 3000), (Some(9000), 500), (None, 500)];
        for (data, expected) in cases {
            t.power_hint(PowerHint::Interaction { data });
            assert_eq!(remaining(&t, "interaction"), Some(Some(expected)), "data {:?}", data);
        }
    }

    #[test]
    fn test_launch_only_forwards_edges_while_screen_on() {
        let t = translator(false);
        assert!(t.power_hint(PowerHint::Launch { active: true }));
        assert!(!t.power_hint(PowerHint::Launch { active: true }));
        assert_eq!(t.engine().current("ddr").as_deref(), Some("1600"));
        t.power_hint(PowerHint::Launch { active: false });
        assert_eq!(remaining(&t, "launch"), None);

        t.set_interactive(false);
        t.power_hint(PowerHint::Launch { active: true });
        assert_eq!(remaining(&t, "launch"), None);
    }

    #[test]
    fn test_video_encode_states() {
        let t = translator(false);
        t.power_hint(PowerHint::VideoEncode { state: 1 });
        assert_eq!(remaining(&t, "video_encode"), Some(None));
        t.power_hint(PowerHint::VideoEncode { state: 7 });
        assert_eq!(remaining(&t, "video_encode"), Some(None));
        t.power_hint(PowerHint::VideoEncode { state: 0 });
        assert_eq!(remaining(&t, "video_encode"), None);
    }

    #[test]
    fn test_screen_off_scene_respects_charging() {
        let t = translator(false);
        t.set_charging(true);
        t.set_interactive(false);
        assert_eq!(t.engine().current("cap"), None);
        assert_eq!(remaining(&t, "screen_off_pulse"), Some(Some(500)));

        t.set_interactive(true);
        t.set_charging(false);
        t.set_interactive(false);
        assert_eq!(t.engine().current("cap").as_deref(), Some("600"));

        t.set_interactive(true);
        assert_eq!(t.engine().current("cap"), None);
        assert!(!t.set_interactive(true));
    }

    #[test]
    fn test_ignore_charging_asserts_screen_off() {
        let t = translator(true);
        t.set_charging(true);
        t.set_interactive(false);
        assert_eq!(t.engine().current("cap").as_deref(), Some("600"));
    }

    #[test]
    fn test_mode_switch() {
        let t = translator(false);
        assert!(t.power_hint(PowerHint::Mode { mode: PowerMode::PowerSave, enable: true }));
        assert_eq!(t.mode(), PowerMode::PowerSave);
        assert_eq!(t.engine().current("cap").as_deref(), Some("1200"));

        // Redundant or mismatched switches are ignored
        assert!(!t.power_hint(PowerHint::Mode { mode: PowerMode::PowerSave, enable: true }));
        assert!(!t.power_hint(PowerHint::Mode { mode: PowerMode::Performance, enable: false }));
        assert_eq!(t.mode(), PowerMode::PowerSave);

        t.set_interactive(false);
        assert_eq!(t.engine().current("cap").as_deref(), Some("300"));

        t.power_hint(PowerHint::Mode { mode: PowerMode::PowerSave, enable: false });
        assert_eq!(t.mode(), PowerMode::Normal);
        assert_eq!(t.engine().current("cap").as_deref(), Some("600"));
    }

    #[test]
    fn test_leaving_mode_releases_its_screen_scene() {
        let config: BoostConfig = serde_json::from_value(json!({
            "resources": [ { "name": "cap", "raw": { "path": "/sys/cap" } } ],
            "scenes": [
                { "name": "screen_on", "mode": "performance", "actions": [ { "resource": "cap", "value": "1800" } ] }
            ]
        }))
        .unwrap();
        let registry = Arc::new(Registry::from_config(&config).unwrap());
        let nodes = Arc::new(MemoryNodes::new());
        nodes.add_node("/sys/cap");
        let engine = Engine::new(registry, nodes.clone()).with_clock(Arc::new(ManualClock::new()));
        let t = HintTranslator::new(Arc::new(engine), SceneIds::default(), false);

        assert!(t.power_hint(PowerHint::Mode { mode: PowerMode::Performance, enable: true }));
        assert_eq!(t.engine().current("cap").as_deref(), Some("1800"));

        t.power_hint(PowerHint::Mode { mode: PowerMode::Performance, enable: false });
        assert_eq!(t.mode(), PowerMode::Normal);
        assert_eq!(t.engine().current("cap"), None);
        assert_eq!(remaining(&t, "screen_on"), None);

        t.set_interactive(false);
        t.set_interactive(true);
        assert_eq!(t.engine().current("cap"), None);
        assert_eq!(nodes.writes_to(std::path::Path::new("/sys/cap")), vec!["1800"]);
    }

    #[test]
    fn test_custom_scene_data() {
        let t = translator(false);
        t.power_hint(PowerHint::Custom { scene: "camera".into(), data: Some(1) });
        assert_eq!(remaining(&t, "camera"), Some(None));
        t.power_hint(PowerHint::Custom { scene: "camera".into(), data: Some(50) });
        assert_eq!(remaining(&t, "camera"), Some(Some(500)));
        t.power_hint(PowerHint::Custom { scene: "camera".into(), data: Some(-3) });
        assert_eq!(remaining(&t, "camera"), Some(Some(500)));
        t.power_hint(PowerHint::Custom { scene: "camera".into(), data: None });
        assert_eq!(remaining(&t, "camera"), None);
        assert!(!t.power_hint(PowerHint::Custom { scene: "unknown".into(), data: Some(1) }));
    }

    #[test]
    fn test_scene_ids_and_disable() {
        let t = translator(false);
        assert_eq!(t.get_scene_id("camera"), 7);
        assert_eq!(t.get_scene_id("vsync"), 0);
        t.engine().set_engine_enabled(false);
        assert_eq!(t.get_scene_id("camera"), 0);
        assert!(!t.power_hint(PowerHint::Interaction { data: Some(1000) }));
    }
}
