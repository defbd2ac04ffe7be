//! Subroutine call graph and cross-frame stack bounds
//!
//! Each frame (the main code or one subroutine) is validated against its own
//! stack base, so a frame only knows its own peak relative depth. The real
//! depth of a call chain is the sum of the bases at which each callee was
//! entered plus the callee's peak. [`CallGraph`] combines the per-frame peaks
//! along call edges and reports which frames cannot be bounded statically
//! because they are, or reach, a recursive cycle.

use std::{collections::BTreeMap, fmt};

use petgraph::{
    algo::{tarjan_scc, toposort},
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

/// Identity of a validation frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameId {
    /// Top-level code entered at offset 0
    Main,
    /// Subroutine entered at the `BEGINSUB` at this offset
    Subroutine(usize),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameId::Main => write!(f, "main"),
            FrameId::Subroutine(entry) => write!(f, "subroutine@{entry:#x}"),
        }
    }
}

/// A `JUMPSUB` observed during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Offset of the `JUMPSUB`
    pub offset: usize,
    /// Frame containing the `JUMPSUB`
    pub caller: FrameId,
    /// Frame entered by the call
    pub callee: FrameId,
    /// Callee stack base, relative to the caller's base
    pub base: usize,
}

/// Worst-case stack depth of a frame including everything it calls
///
/// In both variants `depth` is the deepest chain that never goes around a
/// recursive cycle, and `via` is the call site in this frame that starts it
/// (None when the frame's own peak is the deepest point).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackBound {
    /// Depth never exceeds `depth` items above the frame's base.
    Bounded { depth: usize, via: Option<usize> },
    /// The frame is part of, or calls into, recursion. Going around the
    /// cycle is checked at runtime; `depth` is still a static lower bound.
    Unbounded { depth: usize, via: Option<usize> },
}

impl StackBound {
    /// The bound as a number of items, if one exists
    pub fn depth(&self) -> Option<usize> {
        match self {
            StackBound::Bounded { depth, .. } => Some(*depth),
            StackBound::Unbounded { .. } => None,
        }
    }

    /// Deepest chain without recursion and the call site that starts it
    pub fn acyclic(&self) -> (usize, Option<usize>) {
        match *self {
            StackBound::Bounded { depth, via } | StackBound::Unbounded { depth, via } => {
                (depth, via)
            }
        }
    }

    pub fn is_recursive(&self) -> bool {
        matches!(self, StackBound::Unbounded { .. })
    }
}

/// Call graph over validation frames.
///
/// Nodes are frames, edges are call sites. Built after the control-flow walk
/// from the per-frame peak depths and the recorded call sites.
pub struct CallGraph {
    graph: DiGraph<FrameId, CallSite>,
    peaks: BTreeMap<FrameId, usize>,
}

impl CallGraph {
    /// Build the graph from per-frame peak depths and call sites.
    ///
    /// Frames that only appear in `calls` get a peak of zero.
    pub fn new(peaks: &BTreeMap<FrameId, usize>, calls: &[CallSite]) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: BTreeMap<FrameId, NodeIndex> = BTreeMap::new();

        for &frame in peaks.keys() {
            nodes.insert(frame, graph.add_node(frame));
        }
        for site in calls {
            let caller = *nodes
                .entry(site.caller)
                .or_insert_with(|| graph.add_node(site.caller));
            let callee = *nodes
                .entry(site.callee)
                .or_insert_with(|| graph.add_node(site.callee));
            graph.add_edge(caller, callee, *site);
        }

        Self {
            graph,
            peaks: peaks.clone(),
        }
    }

    /// Returns a frame on a recursive cycle, or None if the graph is acyclic.
    pub fn recursion_entry(&self) -> Option<FrameId> {
        toposort(&self.graph, None)
            .err()
            .map(|cycle| self.graph[cycle.node_id()])
    }

    /// Compute the stack bound of every frame.
    ///
    /// `tarjan_scc` yields components callees first, so every callee outside
    /// the current component already has its bound. A component is recursive
    /// when it has more than one frame or a frame that calls itself. Calls
    /// inside a recursive component are left out of its frames' depths.
    pub fn stack_bounds(&self) -> BTreeMap<FrameId, StackBound> {
        let mut bounds: BTreeMap<FrameId, StackBound> = BTreeMap::new();

        for component in tarjan_scc(&self.graph) {
            let recursive = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&node| self.graph.contains_edge(node, node));

            for &node in &component {
                let frame = self.graph[node];
                let mut depth = self.peaks.get(&frame).copied().unwrap_or(0);
                let mut via = None;
                let mut reaches_recursion = recursive;

                for edge in self.graph.edges(node) {
                    if component.contains(&edge.target()) {
                        continue;
                    }
                    let Some(callee) = bounds.get(&self.graph[edge.target()]) else {
                        continue;
                    };
                    reaches_recursion |= callee.is_recursive();
                    let site = edge.weight();
                    let total = site.base + callee.acyclic().0;
                    if total > depth {
                        depth = total;
                        via = Some(site.offset);
                    }
                }

                let bound = if reaches_recursion {
                    StackBound::Unbounded { depth, via }
                } else {
                    StackBound::Bounded { depth, via }
                };
                bounds.insert(frame, bound);
            }
        }

        bounds
    }
}
