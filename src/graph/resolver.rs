use crate::config::settings::EngineSettings;
use crate::core::entity::EntityCode;
use crate::error::Result;
use crate::graph::ownership_graph::{OwnershipEdge, OwnershipGraph};
use chrono::NaiveDate;
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How an entity enters the consolidated result.
///
/// Resolved once here and carried with the entity through translation,
/// elimination and NCI so no later stage re-derives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationMethod {
    /// Controlled: lines at 100%, minority share disclosed as NCI.
    Full,
    /// Jointly controlled: lines scaled by the effective percentage.
    Proportional,
    /// Significant influence: not aggregated line by line.
    Equity,
}

impl fmt::Display for ConsolidationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsolidationMethod::Full => "full",
            ConsolidationMethod::Proportional => "proportional",
            ConsolidationMethod::Equity => "equity",
        };
        f.write_str(s)
    }
}

/// Why a reachable entity is listed but not part of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    BelowMateriality,
    NoSignificantInfluence,
}

/// One ownership chain from the group parent to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipPath {
    pub entities: Vec<EntityCode>,
    pub percentage: Decimal,
}

/// Resolver output for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub entity: EntityCode,
    /// Sum of path products, capped at 1.
    pub effective_percentage: Decimal,
    /// Direct holding by parents the group controls; drives classification.
    pub controlled_holding: Decimal,
    pub method: ConsolidationMethod,
    pub exclusion: Option<Exclusion>,
    pub paths: Vec<OwnershipPath>,
}

impl ResolvedEntity {
    /// Included in line-by-line aggregation.
    pub fn is_consolidated(&self) -> bool {
        self.exclusion.is_none() && self.method != ConsolidationMethod::Equity
    }

    /// Minority share attributable to NCI, zero unless fully consolidated.
    pub fn nci_share(&self) -> Decimal {
        if self.method == ConsolidationMethod::Full && self.exclusion.is_none() {
            Decimal::ONE - self.effective_percentage
        } else {
            Decimal::ZERO
        }
    }

    /// Factor applied to the entity's translated lines before aggregation.
    pub fn line_scale(&self) -> Decimal {
        match self.method {
            ConsolidationMethod::Full => Decimal::ONE,
            ConsolidationMethod::Proportional => self.effective_percentage,
            ConsolidationMethod::Equity => Decimal::ZERO,
        }
    }
}

/// Every entity reachable from the group parent at the as-of date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipResolution {
    pub root: EntityCode,
    pub as_of: NaiveDate,
    entities: Vec<ResolvedEntity>,
}

impl OwnershipResolution {
    /// Entities in entity-code order.
    pub fn entities(&self) -> &[ResolvedEntity] {
        &self.entities
    }

    pub fn get(&self, entity: &EntityCode) -> Option<&ResolvedEntity> {
        self.entities
            .binary_search_by(|r| r.entity.cmp(entity))
            .ok()
            .map(|i| &self.entities[i])
    }

    pub fn consolidated(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.entities.iter().filter(|e| e.is_consolidated())
    }

    pub fn excluded(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.entities.iter().filter(|e| e.exclusion.is_some())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Computes effective ownership and consolidation method per entity.
///
/// Effective ownership sums the products along every distinct path from the
/// parent (step ownership). Control is judged on direct holdings only: the
/// sum of an entity's direct holdings by parents that are themselves fully
/// consolidated (or the group parent).
///
/// # Examples
///
/// ```
/// use consolidation_engine::prelude::*;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// let edges = vec![
///     OwnershipEdge::new("P", "A", dec!(0.80), from),
///     OwnershipEdge::new("A", "B", dec!(0.75), from),
/// ];
/// let resolver = OwnershipResolver::new(EngineSettings::default());
/// let as_of = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
/// let resolution = resolver.resolve(&EntityCode::new("P"), &edges, as_of).unwrap();
///
/// let b = resolution.get(&EntityCode::new("B")).unwrap();
/// assert_eq!(b.effective_percentage, dec!(0.60));
/// assert_eq!(b.method, ConsolidationMethod::Full);
/// ```
#[derive(Debug, Clone)]
pub struct OwnershipResolver {
    settings: EngineSettings,
}

impl OwnershipResolver {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn resolve(
        &self,
        root: &EntityCode,
        edges: &[OwnershipEdge],
        as_of: NaiveDate,
    ) -> Result<OwnershipResolution> {
        let graph = OwnershipGraph::build(root, edges, as_of)?;
        let paths = enumerate_paths(&graph);

        // Acyclic by construction, so toposort cannot fail.
        let order = toposort(graph.inner(), None).unwrap_or_default();

        let mut resolved: HashMap<NodeIndex, ResolvedEntity> = HashMap::new();
        for node in order {
            if node == graph.root() {
                resolved.insert(
                    node,
                    ResolvedEntity {
                        entity: graph.entity(node).clone(),
                        effective_percentage: Decimal::ONE,
                        controlled_holding: Decimal::ONE,
                        method: ConsolidationMethod::Full,
                        exclusion: None,
                        paths: Vec::new(),
                    },
                );
                continue;
            }
            let Some(node_paths) = paths.get(&node) else {
                continue;
            };

            let effective: Decimal = node_paths
                .iter()
                .map(|p| p.percentage)
                .sum::<Decimal>()
                .min(Decimal::ONE);

            let mut controlled_holding = Decimal::ZERO;
            let mut joint = false;
            for (parent, holding) in graph.parents(node) {
                let parent_controlled = resolved.get(&parent).map_or(false, |p| {
                    p.method == ConsolidationMethod::Full && p.exclusion.is_none()
                });
                if parent_controlled {
                    controlled_holding += holding.percentage;
                    joint |= holding.joint_control;
                }
            }
            let controlled_holding = controlled_holding.min(Decimal::ONE);

            let (method, mut exclusion) = if joint {
                (ConsolidationMethod::Proportional, None)
            } else if controlled_holding >= self.settings.control_threshold {
                (ConsolidationMethod::Full, None)
            } else if effective >= self.settings.significant_influence_threshold {
                (ConsolidationMethod::Equity, None)
            } else {
                (ConsolidationMethod::Equity, Some(Exclusion::NoSignificantInfluence))
            };

            if exclusion.is_none() && effective < self.settings.materiality_threshold {
                exclusion = Some(Exclusion::BelowMateriality);
            }

            let entity = graph.entity(node).clone();
            log::debug!(
                "resolved {}: effective {} controlled {} method {} excluded {:?}",
                entity,
                effective,
                controlled_holding,
                method,
                exclusion
            );

            resolved.insert(
                node,
                ResolvedEntity {
                    entity,
                    effective_percentage: effective,
                    controlled_holding,
                    method,
                    exclusion,
                    paths: node_paths.clone(),
                },
            );
        }

        let mut entities: Vec<ResolvedEntity> = resolved.into_values().collect();
        entities.sort_by(|a, b| a.entity.cmp(&b.entity));

        Ok(OwnershipResolution {
            root: root.clone(),
            as_of,
            entities,
        })
    }
}

/// Depth-first enumeration of every path from the root.
///
/// Children are visited in node-index order so the path list is reproducible.
fn enumerate_paths(graph: &OwnershipGraph) -> HashMap<NodeIndex, Vec<OwnershipPath>> {
    let mut result: HashMap<NodeIndex, Vec<OwnershipPath>> = HashMap::new();
    let mut stack: Vec<(Vec<NodeIndex>, Decimal)> = vec![(vec![graph.root()], Decimal::ONE)];

    while let Some((path, product)) = stack.pop() {
        let Some(&last) = path.last() else {
            continue;
        };
        // Reverse so the lowest index is explored first off the stack.
        for (child, holding) in graph.children(last).into_iter().rev() {
            let mut next = path.clone();
            next.push(child);
            let pct = product * holding.percentage;
            result.entry(child).or_default().push(OwnershipPath {
                entities: next.iter().map(|n| graph.entity(*n).clone()).collect(),
                percentage: pct,
            });
            stack.push((next, pct));
        }
    }

    for paths in result.values_mut() {
        paths.sort_by(|a, b| a.entities.cmp(&b.entities));
    }
    result
}
