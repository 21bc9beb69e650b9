//! Hardware interaction modules
//!
//! Control-node I/O and frequency table discovery.

mod freq_table;
mod node;

pub use freq_table::{FreqSelector, FrequencyTable};
pub use node::{is_indexed_node, write_member_value, MemoryNodes, NodeWriter, SysfsWriter};

#[cfg(test)]
pub use node::MockNodeWriter;
