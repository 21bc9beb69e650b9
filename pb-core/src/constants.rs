//! Constants and configuration values for perfboost
//!
//! Centralizes durations, paths and table sizes used across the engine.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Default configuration file
    pub const CONFIG_FILE: &str = "/etc/perfboost/perfboost.json";

    /// Presence of this file disables boosting at startup
    pub const BOOST_DISABLE_FLAG: &str = "/etc/perfboost/boost_disable";

    /// Kernel-exposed list of supported DDR frequencies
    pub const DDR_FREQ_TABLE: &str = "/sys/class/devfreq/scene-frequency/sprd_governor/ddrinfo_freq_table";

    /// Daemon socket
    pub const SOCKET: &str = "/run/perfboost.sock";

    /// Daemon PID file
    pub const PID_FILE: &str = "/run/perfboostd.pid";
}

/// Boost duration policy for power hints
pub mod boost {
    /// Duration used when a hint carries an out-of-range duration
    pub const DURATION_DEFAULT_MS: u32 = 500;

    /// Longest duration a hint may request
    pub const DURATION_MAX_MS: u32 = 5000;

    /// Pause between swapping screen scenes outside normal mode
    pub const SCENE_SWAP_DELAY_MS: u64 = 60;
}

/// Scene names the hint translator submits under
pub mod scenes {
    pub const INTERACTION: &str = "interaction";
    pub const LAUNCH: &str = "launch";
    pub const VIDEO_ENCODE: &str = "video_encode";
    pub const SCREEN_ON: &str = "screen_on";
    pub const SCREEN_OFF: &str = "screen_off";
    pub const SCREEN_ON_PULSE: &str = "screen_on_pulse";
    pub const SCREEN_OFF_PULSE: &str = "screen_off_pulse";
}

/// Frequency table bootstrap
pub mod freq {
    /// Number of entries in a normalized frequency table
    pub const TABLE_SIZE: usize = 8;

    /// Largest frequency list the kernel node is expected to expose
    pub const MAX_SOURCE_BYTES: u64 = 4096;

    /// Selector resolving to the highest supported step
    pub const SELECTOR_MAX: &str = "max";

    /// Selector resolving to the lowest supported step
    pub const SELECTOR_MIN: &str = "min";

    /// Prefix of an indexed selector (`level:<n>`)
    pub const SELECTOR_LEVEL_PREFIX: &str = "level:";
}

/// Node write encodings
pub mod node {
    /// Filename fragments marking nodes that take one `"<index> <token>"` write per token
    pub const INDEXED_MARKERS: &[&str] = &["overflow", "underflow"];

    /// Prefix written to assert a value on an enable-tagged node
    pub const TAG_ENABLE: u8 = 1;

    /// Prefix written to withdraw a value on an enable-tagged node
    pub const TAG_DISABLE: u8 = 0;

    /// Separator between a scene name and its suffix data
    pub const SCENE_SUFFIX_SEPARATOR: char = ':';
}

/// Timer dispatch
pub mod timing {
    use super::Duration;

    /// Upper bound on how long the dispatch thread sleeps with nothing armed
    pub const DISPATCH_IDLE_WAIT: Duration = Duration::from_secs(60);

    /// Longest boost duration the engine accepts (one day)
    pub const MAX_DURATION_MS: u32 = 24 * 60 * 60 * 1000;
}

/// Size limits for loaded configuration
pub mod limits {
    /// Maximum config file size (1MB)
    pub const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

    /// Maximum number of resources in one catalog
    pub const MAX_RESOURCES: usize = 64;

    /// Largest frequency table a raw node may declare
    pub const MAX_TABLE_SIZE: usize = 64;

    /// Maximum length of a resource, scene or requester name
    pub const MAX_NAME_LENGTH: usize = 128;
}
