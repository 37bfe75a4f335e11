use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// Find one directed cycle, if any.
///
/// Depth-first search with a visiting/visited marker per node. Roots and
/// neighbours are explored in node-index order, so the reported cycle is the
/// same for the same graph. The returned path starts and ends at the same node.
///
/// The search is iterative; deep ownership chains cannot overflow the stack.
pub fn find_cycle<N, E>(graph: &DiGraph<N, E>) -> Option<Vec<NodeIndex>> {
    let mut marks = vec![Mark::Unvisited; graph.node_count()];

    for start in graph.node_indices() {
        if marks[start.index()] != Mark::Unvisited {
            continue;
        }

        // (node, sorted successors, next successor position)
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
        marks[start.index()] = Mark::Visiting;
        stack.push((start, successors(graph, start), 0));

        while let Some((node, next, pos)) = stack.last_mut() {
            if *pos < next.len() {
                let succ = next[*pos];
                *pos += 1;
                match marks[succ.index()] {
                    Mark::Visiting => {
                        let from = stack
                            .iter()
                            .position(|(n, _, _)| *n == succ)
                            .unwrap_or(0);
                        let mut path: Vec<NodeIndex> =
                            stack[from..].iter().map(|(n, _, _)| *n).collect();
                        path.push(succ);
                        return Some(path);
                    }
                    Mark::Unvisited => {
                        marks[succ.index()] = Mark::Visiting;
                        let succs = successors(graph, succ);
                        stack.push((succ, succs, 0));
                    }
                    Mark::Visited => {}
                }
            } else {
                marks[node.index()] = Mark::Visited;
                stack.pop();
            }
        }
    }
    None
}

fn successors<N, E>(graph: &DiGraph<N, E>, node: NodeIndex) -> Vec<NodeIndex> {
    let mut out: Vec<NodeIndex> = graph.neighbors_directed(node, Direction::Outgoing).collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(n: usize, edges: &[(usize, usize)]) -> DiGraph<usize, ()> {
        let mut g = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..n).map(|i| g.add_node(i)).collect();
        for &(a, b) in edges {
            g.add_edge(nodes[a], nodes[b], ());
        }
        g
    }

    #[test]
    fn test_simple_cycle() {
        let g = graph_of(3, &[(0, 1), (1, 2), (2, 0)]);
        let path = find_cycle(&g).unwrap();
        let ids: Vec<usize> = path.iter().map(|n| n.index()).collect();
        assert_eq!(ids, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_no_cycle_in_diamond() {
        // 0 -> 1 -> 3, 0 -> 2 -> 3: two paths, not a cycle
        let g = graph_of(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        assert!(find_cycle(&g).is_none());
    }

    #[test]
    fn test_cycle_not_reachable_from_first_node() {
        let g = graph_of(4, &[(0, 1), (2, 3), (3, 2)]);
        let path = find_cycle(&g).unwrap();
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_two_node_mutual_ownership() {
        let g = graph_of(2, &[(0, 1), (1, 0)]);
        assert!(find_cycle(&g).is_some());
    }
}
