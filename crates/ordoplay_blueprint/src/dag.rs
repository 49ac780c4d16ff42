// SPDX-License-Identifier: MIT OR Apache-2.0
//! DAG construction, reachability pruning and scheduling.
//!
//! Scheduling runs Kahn's algorithm from the sinks toward the sources
//! over the part of the graph that feeds the requested roots. Anything
//! not reachable backward from a root is never scheduled.

use crate::connection::Link;
use crate::graph::Graph;
use crate::node::{Node, NodeId};
use crate::port::{Binding, SlotId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How links that cannot be wired are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkPolicy {
    /// Drop the link and log a warning
    #[default]
    Lenient,
    /// Fail DAG construction
    Strict,
}

/// A link that does not fit the graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StructuralError {
    /// One of the link's endpoints is not in the graph
    #[error("Link {link} references missing node {node}")]
    MissingNode {
        /// Offending link
        link: Link,
        /// Missing node
        node: NodeId,
    },

    /// The producer has no such output slot
    #[error("Link {link} starts at missing output slot")]
    MissingOutput {
        /// Offending link
        link: Link,
    },

    /// The consumer has no such input slot
    #[error("Link {link} ends at missing input slot")]
    MissingInput {
        /// Offending link
        link: Link,
    },

    /// The consumer input already has a producer
    #[error("Link {link} targets an input already fed by {}:{}", .existing.node, .existing.output)]
    InputAlreadyBound {
        /// Offending link
        link: Link,
        /// Binding that was kept
        existing: Binding,
    },
}

/// Error when the reachable subgraph contains a cycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Graph contains a cycle through {} node(s): {unscheduled:?}", .unscheduled.len())]
pub struct CycleError {
    /// Reachable nodes that could not be ordered
    pub unscheduled: Vec<NodeId>,
}

/// Evaluation plan for a set of roots
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    /// Kahn frontiers, sinks first (informational)
    pub levels: Vec<Vec<NodeId>>,
    /// Producers before consumers
    pub order: Vec<NodeId>,
}

impl Schedule {
    /// Position of a node in the evaluation order
    pub fn position(&self, node_id: NodeId) -> Option<usize> {
        self.order.iter().position(|id| *id == node_id)
    }

    /// Whether the node was scheduled
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.order.contains(&node_id)
    }

    /// Number of scheduled nodes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing was scheduled
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A graph with resolved input bindings and adjacency
#[derive(Debug, Clone)]
pub struct Dag {
    graph: Graph,
    /// Consumers fed by each node, one entry per link
    outgoing: IndexMap<NodeId, Vec<NodeId>>,
    /// Producers feeding each node, one entry per link
    incoming: IndexMap<NodeId, Vec<NodeId>>,
    dropped: Vec<StructuralError>,
}

impl Dag {
    /// Wire every link of `graph` into adjacency lists and input bindings
    pub fn build(mut graph: Graph, policy: LinkPolicy) -> Result<Self, StructuralError> {
        let ids: Vec<NodeId> = graph.nodes().map(|n| n.id).collect();
        for id in &ids {
            if let Some(node) = graph.node_mut(*id) {
                node.inputs.iter_mut().for_each(|input| input.binding = None);
            }
        }

        let mut outgoing: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();
        let mut incoming: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();
        let mut dropped = Vec::new();

        let links = graph.links().to_vec();
        for link in links {
            if Self::touches_unresolved_call(&graph, &link) {
                outgoing.entry(link.start_node_id).or_default().push(link.end_node_id);
                incoming.entry(link.end_node_id).or_default().push(link.start_node_id);
                continue;
            }
            match Self::bind(&mut graph, &link) {
                Ok(()) => {
                    outgoing.entry(link.start_node_id).or_default().push(link.end_node_id);
                    incoming.entry(link.end_node_id).or_default().push(link.start_node_id);
                }
                Err(err) => match policy {
                    LinkPolicy::Strict => return Err(err),
                    LinkPolicy::Lenient => {
                        tracing::warn!("Dropping link: {err}");
                        dropped.push(err);
                    }
                },
            }
        }

        Ok(Self {
            graph,
            outgoing,
            incoming,
            dropped,
        })
    }

    /// Unresolved calls have no slots; their links only carry reachability
    fn touches_unresolved_call(graph: &Graph, link: &Link) -> bool {
        let unresolved = |id| graph.node(id).is_some_and(|n| n.kind.is_unresolved_call());
        graph.node(link.start_node_id).is_some()
            && graph.node(link.end_node_id).is_some()
            && (unresolved(link.start_node_id) || unresolved(link.end_node_id))
    }

    fn bind(graph: &mut Graph, link: &Link) -> Result<(), StructuralError> {
        let producer = graph.node(link.start_node_id).ok_or(StructuralError::MissingNode {
            link: *link,
            node: link.start_node_id,
        })?;
        if producer.output(link.start_slot_id).is_none() {
            return Err(StructuralError::MissingOutput { link: *link });
        }

        let consumer = graph.node_mut(link.end_node_id).ok_or(StructuralError::MissingNode {
            link: *link,
            node: link.end_node_id,
        })?;
        let input = consumer
            .input_mut(link.end_slot_id)
            .ok_or(StructuralError::MissingInput { link: *link })?;
        if let Some(existing) = input.binding {
            return Err(StructuralError::InputAlreadyBound {
                link: *link,
                existing,
            });
        }

        input.binding = Some(Binding {
            node: link.start_node_id,
            output: link.start_slot_id,
        });
        Ok(())
    }

    /// The underlying graph, with bindings attached
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.graph.node(node_id)
    }

    /// Producer bound to an input slot
    pub fn binding(&self, node_id: NodeId, slot: SlotId) -> Option<Binding> {
        self.node(node_id)?.input(slot)?.binding
    }

    /// Producers feeding a node
    pub fn incoming(&self, node_id: NodeId) -> &[NodeId] {
        self.incoming.get(&node_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Consumers fed by a node
    pub fn outgoing(&self, node_id: NodeId) -> &[NodeId] {
        self.outgoing.get(&node_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Links rejected while building
    pub fn dropped_links(&self) -> &[StructuralError] {
        &self.dropped
    }

    /// Nodes that transitively feed any of `roots`, in BFS discovery order
    pub fn reachable(&self, roots: &[NodeId]) -> IndexSet<NodeId> {
        let mut reachable = IndexSet::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if self.graph.node(*root).is_some() && reachable.insert(*root) {
                queue.push_back(*root);
            }
        }

        while let Some(current) = queue.pop_front() {
            for producer in self.incoming(current) {
                if reachable.insert(*producer) {
                    queue.push_back(*producer);
                }
            }
        }

        reachable
    }

    /// Order the subgraph feeding `roots`, producers first
    pub fn schedule(&self, roots: &[NodeId]) -> Result<Schedule, CycleError> {
        let reachable = self.reachable(roots);

        let mut remaining: IndexMap<NodeId, usize> = reachable
            .iter()
            .map(|id| {
                let degree = self
                    .outgoing(*id)
                    .iter()
                    .filter(|consumer| reachable.contains(*consumer))
                    .count();
                (*id, degree)
            })
            .collect();

        let mut frontier: Vec<NodeId> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut levels = Vec::new();
        let mut emitted = 0;
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for consumer in &frontier {
                for producer in self.incoming(*consumer) {
                    if let Some(degree) = remaining.get_mut(producer) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*producer);
                        }
                    }
                }
            }
            emitted += frontier.len();
            levels.push(std::mem::replace(&mut frontier, next));
        }

        if emitted < reachable.len() {
            let unscheduled: Vec<NodeId> = remaining
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id)
                .collect();
            tracing::error!(
                "Cycle detected while scheduling roots {:?}: {} of {} reachable nodes unordered ({:?})",
                roots,
                unscheduled.len(),
                reachable.len(),
                unscheduled
            );
            return Err(CycleError { unscheduled });
        }

        let order = levels.iter().rev().flatten().copied().collect();
        Ok(Schedule { levels, order })
    }
}
