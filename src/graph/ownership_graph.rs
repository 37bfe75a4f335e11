use crate::core::entity::EntityCode;
use crate::error::{ConsolidationError, Result};
use crate::graph::cycle_detection::find_cycle;
use chrono::NaiveDate;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A dated ownership relationship: `parent` holds `percentage` of `child`.
///
/// The window is half-open, `[effective_from, effective_to)`; an absent
/// `effective_to` means the edge is still open.
///
/// # Examples
///
/// ```
/// use consolidation_engine::graph::ownership_graph::OwnershipEdge;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// let edge = OwnershipEdge::new("P", "A", dec!(0.80), from);
/// assert!(edge.is_effective(NaiveDate::from_ymd_opt(2025, 11, 30).unwrap()));
/// assert!(!edge.is_effective(NaiveDate::from_ymd_opt(2019, 12, 31).unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipEdge {
    pub parent: EntityCode,
    pub child: EntityCode,
    pub percentage: Decimal,
    pub effective_from: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<NaiveDate>,
    /// Explicitly flags true multi-parent ownership of `child`.
    #[serde(default)]
    pub multi_parent: bool,
    /// The parent shares control of `child` under a joint arrangement.
    #[serde(default)]
    pub joint_control: bool,
}

impl OwnershipEdge {
    pub fn new(
        parent: impl Into<EntityCode>,
        child: impl Into<EntityCode>,
        percentage: Decimal,
        effective_from: NaiveDate,
    ) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            percentage,
            effective_from,
            effective_to: None,
            multi_parent: false,
            joint_control: false,
        }
    }

    pub fn until(mut self, effective_to: NaiveDate) -> Self {
        self.effective_to = Some(effective_to);
        self
    }

    pub fn shared(mut self) -> Self {
        self.multi_parent = true;
        self
    }

    pub fn joint(mut self) -> Self {
        self.joint_control = true;
        self.multi_parent = true;
        self
    }

    pub fn is_effective(&self, as_of: NaiveDate) -> bool {
        self.effective_from <= as_of && self.effective_to.map_or(true, |to| as_of < to)
    }

    fn overlaps(&self, other: &OwnershipEdge) -> bool {
        let self_before_other_ends = other.effective_to.map_or(true, |to| self.effective_from < to);
        let other_before_self_ends = self.effective_to.map_or(true, |to| other.effective_from < to);
        self_before_other_ends && other_before_self_ends
    }

    /// Short label used in error messages.
    pub fn label(&self) -> String {
        match self.effective_to {
            Some(to) => format!(
                "{}->{} {} [{}, {})",
                self.parent, self.child, self.percentage, self.effective_from, to
            ),
            None => format!(
                "{}->{} {} [{}, open)",
                self.parent, self.child, self.percentage, self.effective_from
            ),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ConsolidationError::InvalidOwnershipEdge {
            parent: self.parent.clone(),
            child: self.child.clone(),
            reason: reason.to_string(),
        };
        if self.parent == self.child {
            return Err(invalid("an entity cannot own itself"));
        }
        if self.percentage <= Decimal::ZERO || self.percentage > Decimal::ONE {
            return Err(invalid("percentage must be in (0, 1]"));
        }
        if let Some(to) = self.effective_to {
            if to <= self.effective_from {
                return Err(invalid("effective_to must be after effective_from"));
            }
        }
        Ok(())
    }
}

/// Check every edge and the window invariant across the full edge history.
///
/// Two edges into the same child may overlap in time only when they come from
/// different parents and both are flagged as multi-parent ownership. The same
/// (parent, child) pair may never have two overlapping edges.
pub fn validate_edges(edges: &[OwnershipEdge]) -> Result<()> {
    for edge in edges {
        edge.validate()?;
    }

    let mut by_child: HashMap<&EntityCode, Vec<&OwnershipEdge>> = HashMap::new();
    for edge in edges {
        by_child.entry(&edge.child).or_default().push(edge);
    }

    let mut children: Vec<_> = by_child.into_iter().collect();
    children.sort_by(|a, b| a.0.cmp(b.0));

    for (child, mut incoming) in children {
        incoming.sort_by(|a, b| {
            (&a.parent, a.effective_from).cmp(&(&b.parent, b.effective_from))
        });
        for (i, first) in incoming.iter().enumerate() {
            for second in &incoming[i + 1..] {
                if !first.overlaps(second) {
                    continue;
                }
                let allowed = first.parent != second.parent
                    && first.multi_parent
                    && second.multi_parent;
                if !allowed {
                    return Err(ConsolidationError::OverlappingOwnership {
                        child: child.clone(),
                        first: first.label(),
                        second: second.label(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Weight of an as-of ownership edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holding {
    pub percentage: Decimal,
    pub joint_control: bool,
}

/// The as-of ownership subgraph of a group.
///
/// Entities live in a petgraph arena and are addressed by `NodeIndex`; node
/// indices are assigned in entity-code order so traversal is reproducible.
/// Construction fails if the subgraph contains a cycle.
#[derive(Debug, Clone)]
pub struct OwnershipGraph {
    root: NodeIndex,
    as_of: NaiveDate,
    graph: DiGraph<EntityCode, Holding>,
    index: HashMap<EntityCode, NodeIndex>,
}

impl OwnershipGraph {
    pub fn build(root: &EntityCode, edges: &[OwnershipEdge], as_of: NaiveDate) -> Result<Self> {
        validate_edges(edges)?;

        let active: Vec<&OwnershipEdge> = edges.iter().filter(|e| e.is_effective(as_of)).collect();

        let mut codes: Vec<&EntityCode> = active
            .iter()
            .flat_map(|e| [&e.parent, &e.child])
            .chain(std::iter::once(root))
            .collect();
        codes.sort();
        codes.dedup();

        let mut graph = DiGraph::with_capacity(codes.len(), active.len());
        let mut index = HashMap::with_capacity(codes.len());
        for code in codes {
            let idx = graph.add_node(code.clone());
            index.insert(code.clone(), idx);
        }

        for edge in &active {
            graph.add_edge(
                index[&edge.parent],
                index[&edge.child],
                Holding {
                    percentage: edge.percentage,
                    joint_control: edge.joint_control,
                },
            );
        }

        if let Some(cycle) = find_cycle(&graph) {
            let path = cycle.into_iter().map(|n| graph[n].clone()).collect();
            return Err(ConsolidationError::CyclicOwnership { path });
        }

        log::debug!(
            "ownership graph as of {}: {} entities, {} edges",
            as_of,
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            root: index[root],
            as_of,
            graph,
            index,
        })
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn entity(&self, node: NodeIndex) -> &EntityCode {
        &self.graph[node]
    }

    pub fn node(&self, entity: &EntityCode) -> Option<NodeIndex> {
        self.index.get(entity).copied()
    }

    pub fn entity_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Children of `node` with their holdings, in node-index order.
    pub fn children(&self, node: NodeIndex) -> Vec<(NodeIndex, Holding)> {
        self.sorted_neighbors(node, Direction::Outgoing)
    }

    /// Direct parents of `node` with their holdings, in node-index order.
    pub fn parents(&self, node: NodeIndex) -> Vec<(NodeIndex, Holding)> {
        self.sorted_neighbors(node, Direction::Incoming)
    }

    fn sorted_neighbors(&self, node: NodeIndex, dir: Direction) -> Vec<(NodeIndex, Holding)> {
        use petgraph::visit::EdgeRef;
        let mut out: Vec<(NodeIndex, Holding)> = self
            .graph
            .edges_directed(node, dir)
            .map(|e| {
                let other = if dir == Direction::Outgoing {
                    e.target()
                } else {
                    e.source()
                };
                (other, *e.weight())
            })
            .collect();
        out.sort_by_key(|(n, _)| *n);
        out
    }

    pub(crate) fn inner(&self) -> &DiGraph<EntityCode, Holding> {
        &self.graph
    }
}
