//! Per-voxel logic payloads
//!
//! Voxels may carry attached logic (storage, signals, text, seats). The set of
//! kinds is closed so the engine can match on them instead of inspecting
//! opaque values at runtime.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VoxelPayload {
    /// Item storage with a fixed slot count
    Container { slots: u16, items: Vec<(u16, u32)> },
    /// Signal emitter/receiver with a power level
    Signal { power: u8 },
    /// Free-form text (signs, labels)
    Text(String),
    /// Something a character can occupy
    Seat { occupied: bool },
}

impl VoxelPayload {
    /// Short name of the payload kind, used in logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            VoxelPayload::Container { .. } => "container",
            VoxelPayload::Signal { .. } => "signal",
            VoxelPayload::Text(_) => "text",
            VoxelPayload::Seat { .. } => "seat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(VoxelPayload::Text("hi".into()).kind_name(), "text");
        assert_eq!(VoxelPayload::Seat { occupied: false }.kind_name(), "seat");
    }
}
