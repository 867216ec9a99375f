//! Chu-Liu/Edmonds minimum spanning arborescence over an edge list.

/// Directed weighted edge between dense node ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub cost: f64,
}

impl Edge {
    pub fn new(from: usize, to: usize, cost: f64) -> Self {
        Self { from, to, cost }
    }
}

/// Indices into `edges` forming a minimum-cost arborescence rooted at
/// `root` that spans all `n` nodes, or `None` when some node has no path
/// from the root.
///
/// Ties between equal-cost incoming edges go to the earlier edge.
pub fn min_arborescence(n: usize, root: usize, edges: &[Edge]) -> Option<Vec<usize>> {
    if root >= n {
        return None;
    }
    let mut chosen = contract(n, root, edges)?;
    chosen.sort_unstable();
    Some(chosen)
}

fn contract(n: usize, root: usize, edges: &[Edge]) -> Option<Vec<usize>> {
    const NONE: usize = usize::MAX;

    // cheapest incoming edge per node
    let mut best = vec![NONE; n];
    for (i, e) in edges.iter().enumerate() {
        if e.to == root || e.from == e.to {
            continue;
        }
        if best[e.to] == NONE || e.cost < edges[best[e.to]].cost {
            best[e.to] = i;
        }
    }
    if (0..n).any(|v| v != root && best[v] == NONE) {
        return None;
    }

    // walk best-parent pointers to find cycles
    let mut comp = vec![NONE; n];
    let mut stamp = vec![NONE; n];
    let mut cycles = 0;
    for v in 0..n {
        let mut u = v;
        while u != root && stamp[u] == NONE && comp[u] == NONE {
            stamp[u] = v;
            u = edges[best[u]].from;
        }
        if u != root && stamp[u] == v && comp[u] == NONE {
            let mut w = u;
            loop {
                comp[w] = cycles;
                w = edges[best[w]].from;
                if w == u {
                    break;
                }
            }
            cycles += 1;
        }
    }

    if cycles == 0 {
        return Some((0..n).filter(|&v| v != root).map(|v| best[v]).collect());
    }

    let in_cycle: Vec<bool> = comp.iter().map(|&c| c != NONE).collect();
    let mut next = cycles;
    for c in comp.iter_mut().filter(|c| **c == NONE) {
        *c = next;
        next += 1;
    }

    // contracted graph; `origin` maps reduced edges back to `edges`
    let mut reduced = Vec::new();
    let mut origin = Vec::new();
    for (i, e) in edges.iter().enumerate() {
        let (cu, cv) = (comp[e.from], comp[e.to]);
        if cu == cv {
            continue;
        }
        let cost = if in_cycle[e.to] {
            e.cost - edges[best[e.to]].cost
        } else {
            e.cost
        };
        reduced.push(Edge::new(cu, cv, cost));
        origin.push(i);
    }

    let sub = contract(next, comp[root], &reduced)?;

    let mut result = Vec::with_capacity(n.saturating_sub(1));
    let mut entered = vec![false; n];
    for r in sub {
        let i = origin[r];
        result.push(i);
        if in_cycle[edges[i].to] {
            entered[edges[i].to] = true;
        }
    }
    for v in 0..n {
        if v != root && in_cycle[v] && !entered[v] {
            result.push(best[v]);
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(edges: &[Edge], chosen: &[usize]) -> f64 {
        chosen.iter().map(|&i| edges[i].cost).sum()
    }

    fn parents(n: usize, edges: &[Edge], chosen: &[usize]) -> Vec<Option<usize>> {
        let mut parent = vec![None; n];
        for &i in chosen {
            parent[edges[i].to] = Some(edges[i].from);
        }
        parent
    }

    #[test]
    fn given_acyclic_best_edges_when_solving_then_takes_cheapest_incoming() {
        let edges = vec![
            Edge::new(0, 1, 1.0),
            Edge::new(0, 2, 5.0),
            Edge::new(1, 2, 1.0),
        ];

        let chosen = min_arborescence(3, 0, &edges).expect("feasible");

        assert_eq!(parents(3, &edges, &chosen), vec![None, Some(0), Some(1)]);
        assert_eq!(total(&edges, &chosen), 2.0);
    }

    #[test]
    fn given_cheap_cycle_when_solving_then_breaks_it_at_cheapest_entry() {
        // 1 <-> 2 form a cheap cycle; entering via 1 costs 10, via 2 costs 4
        let edges = vec![
            Edge::new(0, 1, 10.0),
            Edge::new(0, 2, 4.0),
            Edge::new(1, 2, 1.0),
            Edge::new(2, 1, 1.0),
        ];

        let chosen = min_arborescence(3, 0, &edges).expect("feasible");

        assert_eq!(parents(3, &edges, &chosen), vec![None, Some(2), Some(0)]);
        assert_eq!(total(&edges, &chosen), 5.0);
    }

    #[test]
    fn given_nested_cycles_when_solving_then_result_spans_all_nodes() {
        let edges = vec![
            Edge::new(0, 1, 6.0),
            Edge::new(1, 2, 1.0),
            Edge::new(2, 3, 1.0),
            Edge::new(3, 1, 1.0),
            Edge::new(3, 4, 1.0),
            Edge::new(4, 2, 0.5),
            Edge::new(0, 4, 9.0),
        ];

        let chosen = min_arborescence(5, 0, &edges).expect("feasible");
        let parent = parents(5, &edges, &chosen);

        assert_eq!(chosen.len(), 4);
        assert_eq!(parent[1], Some(0));
        assert_eq!(total(&edges, &chosen), 9.0);
    }

    #[test]
    fn given_unreachable_node_when_solving_then_none() {
        let edges = vec![Edge::new(0, 1, 1.0), Edge::new(2, 1, 1.0)];
        assert!(min_arborescence(3, 0, &edges).is_none());
    }
}
