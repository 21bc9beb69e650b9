//! Request Arbitration Engine
//!
//! One coarse mutex guards the arbitration state of every resource. Callers and the
//! expiry dispatch thread both take it before touching an active set, and all hardware
//! writes for a winner change happen while it is held so demotion always precedes
//! assertion.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::applier::{self, MemberValues};
use super::request::{ActiveRequestSet, DefaultPriorityPolicy, PriorityPolicy, RequestItem};
use super::timer::{DeadlineHandler, ExpiryTimer};
use crate::clock::{Clock, MonotonicClock};
use crate::constants::timing::MAX_DURATION_MS;
use crate::data::{ControlResource, RawNode, Registry, ResourceKind};
use crate::error::{BoostError, Result};
use crate::hw::{FreqSelector, FrequencyTable, NodeWriter};

/// Per-resource arbitration state
#[derive(Debug, Default)]
struct ResourceState {
    active: ActiveRequestSet,
    /// Value or scene last applied, `None` while idle
    current: Option<String>,
    freq_table: Option<FrequencyTable>,
    members: MemberValues,
}

#[derive(Debug)]
struct EngineState {
    enabled: bool,
    next_seq: u64,
    resources: HashMap<String, ResourceState>,
}

/// Point-in-time view of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub name: String,
    pub current: Option<String>,
    /// Milliseconds until the armed deadline fires
    pub deadline_ms: Option<u64>,
    /// Lowest priority first; the last entry is the winner
    pub requests: Vec<RequestSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub requester: String,
    pub value: String,
    pub priority: u32,
    pub remaining_ms: Option<u64>,
}

/// Arbitrates competing boost requests per resource
pub struct Engine {
    registry: Arc<Registry>,
    nodes: Arc<dyn NodeWriter>,
    clock: Arc<dyn Clock>,
    policy: Box<dyn PriorityPolicy>,
    state: Mutex<EngineState>,
    timer: ExpiryTimer,
}

impl Engine {
    /// Create an enabled engine with the monotonic clock and default priority policy
    pub fn new(registry: Arc<Registry>, nodes: Arc<dyn NodeWriter>) -> Self {
        Self {
            registry,
            nodes,
            clock: Arc::new(MonotonicClock),
            policy: Box::new(DefaultPriorityPolicy),
            state: Mutex::new(EngineState {
                enabled: true,
                next_seq: 0,
                resources: HashMap::new(),
            }),
            timer: ExpiryTimer::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn PriorityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Start the expiry dispatch thread
    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.timer.start(Arc::downgrade(self))
    }

    /// Stop the expiry dispatch thread; armed deadlines stay recorded
    pub fn stop(&self) {
        self.timer.stop();
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Deadline currently armed for a resource
    pub fn armed_deadline(&self, resource: &str) -> Option<Instant> {
        let _state = self.state.lock();
        self.timer.deadline(resource)
    }

    /// Value or scene currently applied to a resource
    pub fn current(&self, resource: &str) -> Option<String> {
        self.state
            .lock()
            .resources
            .get(resource)
            .and_then(|rs| rs.current.clone())
    }

    /// Assert (`enable`) or withdraw a requester's ask on a resource
    ///
    /// `duration_ms == 0` means indefinite. Returns whether a hardware write happened.
    pub fn submit_request(
        &self,
        resource: &str,
        requester: &str,
        enable: bool,
        duration_ms: u32,
        value: &str,
    ) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.enabled {
            debug!(resource = %resource, requester = %requester, "{}, ignoring request", BoostError::EngineDisabled);
            return false;
        }
        let Some(control) = self.registry.get(resource) else {
            warn!(resource = %resource, requester = %requester, "{}", BoostError::UnknownResource(resource.to_string()));
            return false;
        };

        let now = self.clock.now();
        let seq = state.next_seq;
        state.next_seq += 1;
        let rs = state.resources.entry(control.name.clone()).or_default();

        if !enable {
            if rs.active.remove(requester).is_none() {
                debug!(resource = %resource, requester = %requester, "no active request to release");
            }
            return self.reconcile(control, rs, now);
        }

        let resolved = match self.resolve_value(control, rs, value) {
            Ok(v) => v,
            Err(e) => {
                warn!(resource = %resource, requester = %requester, "request rejected: {}", e);
                return false;
            }
        };
        let priority = self.policy.priority(control, requester, &resolved);
        if duration_ms > MAX_DURATION_MS {
            debug!(
                resource = %resource,
                requester = %requester,
                "duration {} ms clamped to {} ms",
                duration_ms,
                MAX_DURATION_MS
            );
        }
        let duration_ms = duration_ms.min(MAX_DURATION_MS);
        let expires_at = (duration_ms > 0).then(|| now + Duration::from_millis(u64::from(duration_ms)));

        debug!(
            resource = %resource,
            requester = %requester,
            "request {} (priority {}, {} ms)",
            resolved,
            priority,
            duration_ms
        );
        rs.active.upsert(RequestItem {
            requester: requester.to_string(),
            value: resolved,
            priority,
            seq,
            expires_at,
        });
        self.reconcile(control, rs, now)
    }

    /// Re-evaluate a resource after its deadline passed
    pub fn on_deadline(&self, resource: &str) -> bool {
        let mut guard = self.state.lock();
        if !guard.enabled {
            return false;
        }
        let Some(control) = self.registry.get(resource) else {
            return false;
        };
        let now = self.clock.now();
        match guard.resources.get_mut(resource) {
            Some(rs) => self.reconcile(control, rs, now),
            None => {
                self.timer.disarm(resource);
                false
            }
        }
    }

    /// Globally enable or disable boosting
    ///
    /// Disabling clears every resource to idle and disarms every deadline in one sweep.
    pub fn set_engine_enabled(&self, enabled: bool) {
        let mut guard = self.state.lock();
        if guard.enabled == enabled {
            return;
        }
        guard.enabled = enabled;
        if enabled {
            info!("Boost engine enabled");
            return;
        }

        self.timer.disarm_all();
        for control in self.registry.resources() {
            let Some(rs) = guard.resources.get_mut(&control.name) else {
                continue;
            };
            rs.active.clear();
            if let Some(prev) = rs.current.take() {
                self.clear(control, rs, &prev);
            }
        }
        info!("Boost engine disabled, all resources cleared");
    }

    pub fn snapshot(&self) -> Vec<ResourceSnapshot> {
        let guard = self.state.lock();
        let now = self.clock.now();
        self.registry
            .resources()
            .map(|control| {
                let rs = guard.resources.get(&control.name);
                ResourceSnapshot {
                    name: control.name.clone(),
                    current: rs.and_then(|rs| rs.current.clone()),
                    deadline_ms: self
                        .timer
                        .deadline(&control.name)
                        .map(|at| at.saturating_duration_since(now).as_millis() as u64),
                    requests: rs
                        .map(|rs| {
                            rs.active
                                .iter()
                                .filter(|item| !item.is_expired(now))
                                .map(|item| RequestSnapshot {
                                    requester: item.requester.clone(),
                                    value: item.value.clone(),
                                    priority: item.priority,
                                    remaining_ms: item.remaining(now).map(|d| d.as_millis() as u64),
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Turn a caller-supplied value into the string the set stores
    fn resolve_value(&self, control: &ControlResource, rs: &mut ResourceState, value: &str) -> Result<String> {
        match &control.kind {
            ResourceKind::Raw(node) => {
                let selector = FreqSelector::parse(value)?;
                if selector.needs_table() {
                    self.ensure_table(node, rs)?;
                }
                let table_path = node.freq_table.as_ref().map(|t| &t.path);
                Ok(selector.resolve(rs.freq_table.as_ref(), table_path)?.to_string())
            }
            ResourceKind::Subsystem(subsystem) => {
                if subsystem.resolve(value).is_none() {
                    return Err(BoostError::UnknownScene {
                        subsystem: control.name.clone(),
                        scene: value.to_string(),
                    });
                }
                Ok(value.to_string())
            }
        }
    }

    fn ensure_table(&self, node: &RawNode, rs: &mut ResourceState) -> Result<()> {
        if rs.freq_table.is_some() {
            return Ok(());
        }
        let source = node.freq_table.as_ref().ok_or_else(|| BoostError::FreqTableUnavailable {
            path: node.path.clone(),
            reason: "no frequency table configured".to_string(),
        })?;
        let table = FrequencyTable::bootstrap(self.nodes.as_ref(), &source.path, source.size)?;
        info!("Frequency table {} ready: {:?}", source.path.display(), table.steps());
        rs.freq_table = Some(table);
        Ok(())
    }

    /// Bring hardware and the deadline in line with the current winner
    fn reconcile(&self, control: &ControlResource, rs: &mut ResourceState, now: Instant) -> bool {
        for expired in rs.active.purge_expired(now) {
            debug!(resource = %control.name, requester = %expired.requester, "request expired");
        }

        let Some(winner) = rs.active.winner() else {
            self.timer.disarm(&control.name);
            return match rs.current.take() {
                Some(prev) => {
                    debug!(resource = %control.name, "idle, clearing {}", prev);
                    self.clear(control, rs, &prev)
                }
                None => false,
            };
        };

        match winner.expires_at {
            Some(at) => self.timer.arm(&control.name, at),
            None => self.timer.disarm(&control.name),
        }

        if rs.current.as_deref() == Some(winner.value.as_str()) {
            debug!(resource = %control.name, "winner {} already applied", winner.value);
            return false;
        }

        let next = winner.value.clone();
        debug!(
            resource = %control.name,
            requester = %winner.requester,
            "winner {} -> {}",
            rs.current.as_deref().unwrap_or("idle"),
            next
        );
        self.switch(control, rs, next)
    }

    fn switch(&self, control: &ControlResource, rs: &mut ResourceState, next: String) -> bool {
        match &control.kind {
            ResourceKind::Raw(node) => {
                let wrote = applier::apply_raw(
                    self.nodes.as_ref(),
                    &control.name,
                    node,
                    rs.current.as_deref(),
                    &next,
                );
                rs.current = Some(next);
                wrote
            }
            ResourceKind::Subsystem(subsystem) => {
                match applier::apply_subsystem(
                    self.nodes.as_ref(),
                    &control.name,
                    subsystem,
                    &mut rs.members,
                    &next,
                ) {
                    Ok(wrote) => {
                        rs.current = Some(next);
                        wrote
                    }
                    Err(e) => {
                        warn!(resource = %control.name, "{}", e);
                        false
                    }
                }
            }
        }
    }

    fn clear(&self, control: &ControlResource, rs: &mut ResourceState, prev: &str) -> bool {
        match &control.kind {
            ResourceKind::Raw(node) => applier::clear_raw(self.nodes.as_ref(), &control.name, node, prev),
            ResourceKind::Subsystem(subsystem) => {
                applier::clear_subsystem(self.nodes.as_ref(), &control.name, subsystem, &mut rs.members)
            }
        }
    }
}

impl DeadlineHandler for Engine {
    fn on_deadline(&self, resource: &str) -> bool {
        Engine::on_deadline(self, resource)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.timer.stop();
    }
}
