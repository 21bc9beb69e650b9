//! Frequency table bootstrap
//!
//! The kernel exposes the DDR steps a SKU supports as one line of decimal integers.
//! Callers address steps symbolically (`max`, `min`, `level:<n>`), so the list is
//! normalized into a fixed-size ascending table where index `size - 1` is always the
//! largest supported step and index `size - 1 - k` the (k+1)-th largest. When the SKU
//! exposes fewer steps than the table holds, the low indices repeat the smallest step.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::node::NodeWriter;
use crate::constants::freq::{MAX_SOURCE_BYTES, SELECTOR_LEVEL_PREFIX, SELECTOR_MAX, SELECTOR_MIN};
use crate::error::{BoostError, Result};

/// Normalized table of supported frequency steps, ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    steps: Vec<u32>,
}

impl FrequencyTable {
    /// Normalize a kernel frequency list into a table of `size` entries
    ///
    /// Non-numeric and non-positive tokens are ignored. Returns `None` when no positive
    /// value is present or `size` is zero.
    pub fn from_source(source: &str, size: usize) -> Option<Self> {
        let mut values: Vec<u32> = source
            .split_whitespace()
            .filter_map(|token| token.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .filter_map(|v| u32::try_from(v).ok())
            .collect();
        if values.is_empty() || size == 0 {
            return None;
        }
        values.sort_unstable();

        let smallest = values[0];
        let mut steps = vec![smallest; size];
        for (slot, value) in steps.iter_mut().rev().zip(values.iter().rev()) {
            *slot = *value;
        }
        Some(Self { steps })
    }

    /// Read and normalize the list exposed at `path`
    pub fn bootstrap(nodes: &dyn NodeWriter, path: &Path, size: usize) -> Result<Self> {
        let content = nodes.read_to_string(path).map_err(|e| BoostError::FreqTableUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if content.len() as u64 > MAX_SOURCE_BYTES {
            return Err(BoostError::FreqTableUnavailable {
                path: path.to_path_buf(),
                reason: format!("source exceeds {} bytes", MAX_SOURCE_BYTES),
            });
        }

        let table = Self::from_source(&content, size).ok_or_else(|| BoostError::FreqTableUnavailable {
            path: path.to_path_buf(),
            reason: "no positive frequency found".to_string(),
        })?;

        for (index, step) in table.steps.iter().enumerate() {
            debug!("{}: freq[{}] = {}", path.display(), index, step);
        }
        Ok(table)
    }

    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Highest supported step
    pub fn max(&self) -> u32 {
        self.steps.last().copied().unwrap_or_default()
    }

    /// Lowest supported step
    pub fn min(&self) -> u32 {
        self.steps.first().copied().unwrap_or_default()
    }

    /// Step at table index `level`
    pub fn level(&self, level: usize) -> Option<u32> {
        self.steps.get(level).copied()
    }
}

/// A parsed raw-node value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreqSelector {
    Max,
    Min,
    Level(usize),
    Literal(u32),
}

impl FreqSelector {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value == SELECTOR_MAX {
            return Ok(Self::Max);
        }
        if value == SELECTOR_MIN {
            return Ok(Self::Min);
        }
        if let Some(level) = value.strip_prefix(SELECTOR_LEVEL_PREFIX) {
            return level
                .parse::<usize>()
                .map(Self::Level)
                .map_err(|_| BoostError::InvalidSelector(value.to_string()));
        }
        value
            .parse::<u32>()
            .map(Self::Literal)
            .map_err(|_| BoostError::InvalidSelector(value.to_string()))
    }

    /// Whether resolving this selector needs the frequency table
    pub fn needs_table(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }

    /// Resolve to a concrete frequency
    pub fn resolve(&self, table: Option<&FrequencyTable>, table_path: Option<&PathBuf>) -> Result<u32> {
        if let Self::Literal(v) = self {
            return Ok(*v);
        }
        let unavailable = |reason: &str| BoostError::FreqTableUnavailable {
            path: table_path.cloned().unwrap_or_default(),
            reason: reason.to_string(),
        };
        let table = table.ok_or_else(|| unavailable("table not populated"))?;
        match self {
            Self::Max => Ok(table.max()),
            Self::Min => Ok(table.min()),
            Self::Level(level) => table.level(*level).ok_or_else(|| {
                warn!("level {} outside table of {} steps", level, table.len());
                BoostError::InvalidSelector(format!("{}{}", SELECTOR_LEVEL_PREFIX, level))
            }),
            Self::Literal(v) => Ok(*v),
        }
    }
}
