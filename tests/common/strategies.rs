//! Proptest strategies for step graphs.

use proptest::prelude::*;

use courier_core::pipeline::{Dependency, DependencyDirection, GraphNode};

#[derive(Debug, Clone)]
pub struct TestNode {
    pub id: String,
    pub befores: Vec<Dependency>,
    pub afters: Vec<Dependency>,
}

impl TestNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            befores: Vec::new(),
            afters: Vec::new(),
        }
    }
}

impl GraphNode for TestNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn befores(&self) -> &[Dependency] {
        &self.befores
    }

    fn afters(&self) -> &[Dependency] {
        &self.afters
    }
}

/// An acyclic constraint set: a hidden ranking of the nodes plus constraints
/// that only ever point from a lower rank to a higher one
#[derive(Debug, Clone)]
pub struct AcyclicGraph {
    pub nodes: Vec<TestNode>,
    /// (earlier, later) pairs every valid order must respect
    pub edges: Vec<(usize, usize)>,
}

pub fn step_id(index: usize) -> String {
    format!("Step{index}")
}

pub fn acyclic_graph_strategy() -> impl Strategy<Value = AcyclicGraph> {
    (1usize..12)
        .prop_flat_map(|count| {
            (
                Just((0..count).collect::<Vec<usize>>()).prop_shuffle(),
                prop::collection::vec((0..count, 0..count, any::<bool>()), 0..24),
            )
        })
        .prop_map(|(ranking, candidates)| {
            let mut rank = vec![0; ranking.len()];
            for (position, node) in ranking.iter().enumerate() {
                rank[*node] = position;
            }

            let mut nodes: Vec<TestNode> = (0..ranking.len()).map(|i| TestNode::new(step_id(i))).collect();
            let mut edges = Vec::new();
            for (a, b, declared_on_earlier) in candidates {
                if a == b {
                    continue;
                }
                let (earlier, later) = if rank[a] < rank[b] { (a, b) } else { (b, a) };
                if declared_on_earlier {
                    nodes[earlier].befores.push(Dependency::new(
                        step_id(earlier),
                        step_id(later),
                        DependencyDirection::Before,
                        true,
                    ));
                } else {
                    nodes[later].afters.push(Dependency::new(
                        step_id(later),
                        step_id(earlier),
                        DependencyDirection::After,
                        true,
                    ));
                }
                edges.push((earlier, later));
            }

            AcyclicGraph { nodes, edges }
        })
}
