//! Active request bookkeeping and priority policy

use std::time::{Duration, Instant};

use crate::data::{scene_suffix, ControlResource, ResourceKind};

/// One requester's live ask on a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestItem {
    pub requester: String,
    /// Resolved frequency (raw) or scene string (subsystem)
    pub value: String,
    pub priority: u32,
    /// Submission order, breaks priority ties in favor of the newest request
    pub seq: u64,
    /// `None` for indefinite requests
    pub expires_at: Option<Instant>,
}

impl RequestItem {
    fn sort_key(&self) -> (u32, u64) {
        (self.priority, self.seq)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

/// Live requests of one resource, ascending by `(priority, seq)`
///
/// The winner is always the last element and each requester holds at most one item.
#[derive(Debug, Default)]
pub struct ActiveRequestSet {
    items: Vec<RequestItem>,
}

impl ActiveRequestSet {
    /// Insert, replacing any item from the same requester
    pub fn upsert(&mut self, item: RequestItem) {
        self.items.retain(|i| i.requester != item.requester);
        let pos = self
            .items
            .partition_point(|i| i.sort_key() <= item.sort_key());
        self.items.insert(pos, item);
    }

    pub fn remove(&mut self, requester: &str) -> Option<RequestItem> {
        let pos = self.items.iter().position(|i| i.requester == requester)?;
        Some(self.items.remove(pos))
    }

    /// Drop every item whose expiry is at or before `now`
    pub fn purge_expired(&mut self, now: Instant) -> Vec<RequestItem> {
        let (expired, live) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|i| i.is_expired(now));
        self.items = live;
        expired
    }

    pub fn winner(&self) -> Option<&RequestItem> {
        self.items.last()
    }

    pub fn get(&self, requester: &str) -> Option<&RequestItem> {
        self.items.iter().find(|i| i.requester == requester)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Computes the priority class of a request at submission time
pub trait PriorityPolicy: Send + Sync {
    /// `value` is already resolved: a decimal frequency for raw nodes, the scene string
    /// for subsystems.
    fn priority(&self, resource: &ControlResource, requester: &str, value: &str) -> u32;
}

/// Higher DRAM floors win on raw nodes; subsystems use the `:<n>` suffix or the
/// config's configured priority.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPriorityPolicy;

impl PriorityPolicy for DefaultPriorityPolicy {
    fn priority(&self, resource: &ControlResource, _requester: &str, value: &str) -> u32 {
        match &resource.kind {
            ResourceKind::Raw(_) => value.trim().parse().unwrap_or(0),
            ResourceKind::Subsystem(subsystem) => scene_suffix(value)
                .and_then(|extra| extra.trim().parse().ok())
                .or_else(|| subsystem.resolve(value).and_then(|c| c.priority))
                .unwrap_or(0),
        }
    }
}
