//! Ownership graph: dated edges, cycle detection and the resolver that turns
//! an as-of graph into effective percentages and consolidation methods.

pub mod cycle_detection;
pub mod ownership_graph;
pub mod resolver;
