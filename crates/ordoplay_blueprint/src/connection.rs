// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::node::NodeId;
use crate::port::SlotId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed link from a producer output to a consumer input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    /// Producer node ID
    pub start_node_id: NodeId,
    /// Producer output slot
    pub start_slot_id: SlotId,
    /// Consumer node ID
    pub end_node_id: NodeId,
    /// Consumer input slot
    pub end_slot_id: SlotId,
}

impl Link {
    /// Create a new link
    pub fn new(
        start_node_id: NodeId,
        start_slot_id: SlotId,
        end_node_id: NodeId,
        end_slot_id: SlotId,
    ) -> Self {
        Self {
            start_node_id,
            start_slot_id,
            end_node_id,
            end_slot_id,
        }
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.start_node_id == node_id || self.end_node_id == node_id
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.start_node_id, self.start_slot_id, self.end_node_id, self.end_slot_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_uses_camel_case_fields() {
        let link = Link::new(NodeId(1), 0, NodeId(2), 3);
        let json = serde_json::to_string(&link).unwrap();
        assert_eq!(
            json,
            r#"{"startNodeId":1,"startSlotId":0,"endNodeId":2,"endSlotId":3}"#
        );
        assert!(link.involves_node(NodeId(2)));
        assert_eq!(link.to_string(), "#1:0 -> #2:3");
    }
}
