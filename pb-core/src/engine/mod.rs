//! Request arbitration, configuration applier, and expiry dispatch

pub mod applier;
mod arbiter;
mod request;
mod timer;

pub use arbiter::{Engine, RequestSnapshot, ResourceSnapshot};
pub use request::{ActiveRequestSet, DefaultPriorityPolicy, PriorityPolicy, RequestItem};
pub use timer::{DeadlineHandler, ExpiryTimer};
