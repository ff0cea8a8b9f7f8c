//! # Dependency Graph Resolver
//!
//! Orders the steps of one stage so that every before/after constraint holds.
//!
//! Uses Kahn's algorithm with a min-heap keyed on registration index, so the
//! result is deterministic: whenever several steps are free to run next, the
//! one registered first wins. Unconstrained steps therefore keep their
//! registration order.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use super::errors::PipelineConfigurationError;
use super::step::{Dependency, DependencyDirection, RegisterStep};
use super::Stage;

/// A node the resolver can order
pub trait GraphNode {
    fn node_id(&self) -> &str;
    fn befores(&self) -> &[Dependency];
    fn afters(&self) -> &[Dependency];
}

impl GraphNode for RegisterStep {
    fn node_id(&self) -> &str {
        self.step_id()
    }

    fn befores(&self) -> &[Dependency] {
        RegisterStep::befores(self)
    }

    fn afters(&self) -> &[Dependency] {
        RegisterStep::afters(self)
    }
}

/// Resolve `nodes` into an execution order, returned as indices into `nodes`
///
/// Soft constraints naming an unknown step are dropped. A required constraint
/// naming an unknown step fails with `MissingDependency`, and an unsatisfiable
/// set of constraints fails with `DependencyCycle` naming only the steps that
/// take part in a cycle.
pub fn resolve_order<N: GraphNode>(
    stage: Stage,
    nodes: &[N],
) -> Result<Vec<usize>, PipelineConfigurationError> {
    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        if index_of.insert(node.node_id(), index).is_some() {
            return Err(PipelineConfigurationError::duplicate_step(node.node_id()));
        }
    }

    // successors[a] contains b when a must run before b
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];

    for (index, node) in nodes.iter().enumerate() {
        for dependency in node.befores().iter().chain(node.afters()) {
            let Some(&target) = index_of.get(dependency.target.as_str()) else {
                if dependency.enforce {
                    return Err(PipelineConfigurationError::MissingDependency {
                        step_id: node.node_id().to_string(),
                        dependency: dependency.target.clone(),
                        direction: dependency.direction,
                        stage,
                    });
                }
                continue;
            };

            match dependency.direction {
                DependencyDirection::Before => successors[index].insert(target),
                DependencyDirection::After => successors[target].insert(index),
            };
        }
    }

    let mut in_degree = vec![0_usize; nodes.len()];
    for targets in &successors {
        for &target in targets {
            in_degree[target] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(current);
        for &next in &successors[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() == nodes.len() {
        return Ok(order);
    }

    let step_ids = cycle_members(&successors, &in_degree)
        .into_iter()
        .map(|index| nodes[index].node_id().to_string())
        .collect();
    Err(PipelineConfigurationError::dependency_cycle(stage, step_ids))
}

/// Nodes left after Kahn's algorithm stall, minus those that merely sit downstream of a cycle
fn cycle_members(successors: &[BTreeSet<usize>], in_degree: &[usize]) -> Vec<usize> {
    let mut remaining: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree > 0)
        .map(|(index, _)| index)
        .collect();

    loop {
        let sinks: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|index| !successors[*index].iter().any(|next| remaining.contains(next)))
            .collect();
        if sinks.is_empty() {
            break;
        }
        for sink in sinks {
            remaining.remove(&sink);
        }
    }

    remaining.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Node {
        id: String,
        befores: Vec<Dependency>,
        afters: Vec<Dependency>,
    }

    impl Node {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                befores: Vec::new(),
                afters: Vec::new(),
            }
        }

        fn before(mut self, target: &str, enforce: bool) -> Self {
            self.befores.push(Dependency::new(
                self.id.clone(),
                target,
                DependencyDirection::Before,
                enforce,
            ));
            self
        }

        fn after(mut self, target: &str, enforce: bool) -> Self {
            self.afters.push(Dependency::new(
                self.id.clone(),
                target,
                DependencyDirection::After,
                enforce,
            ));
            self
        }
    }

    impl GraphNode for Node {
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

    fn ids(nodes: &[Node], order: &[usize]) -> Vec<String> {
        order.iter().map(|index| nodes[*index].id.clone()).collect()
    }

    #[test]
    fn test_unconstrained_steps_keep_registration_order() {
        let nodes = vec![Node::new("A"), Node::new("B"), Node::new("C")];
        let order = resolve_order(Stage::IncomingPhysical, &nodes).unwrap();
        assert_eq!(ids(&nodes, &order), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_empty_stage_resolves_to_empty_order() {
        let nodes: Vec<Node> = Vec::new();
        assert!(resolve_order(Stage::Dispatch, &nodes).unwrap().is_empty());
    }

    #[test]
    fn test_before_and_after_constraints() {
        // A registered first but must run after B
        let nodes = vec![
            Node::new("A").after("B", true),
            Node::new("B"),
            Node::new("C").before("B", true),
        ];
        let order = resolve_order(Stage::IncomingPhysical, &nodes).unwrap();
        assert_eq!(ids(&nodes, &order), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_soft_dependency_on_unknown_step_is_dropped() {
        let nodes = vec![
            Node::new("A").after("Missing", false),
            Node::new("B").before("Ghost", false),
        ];
        let order = resolve_order(Stage::IncomingLogical, &nodes).unwrap();
        assert_eq!(ids(&nodes, &order), vec!["A", "B"]);
    }

    #[test]
    fn test_required_dependency_on_unknown_step_fails() {
        let nodes = vec![Node::new("Audit").after("Nope", true)];
        let err = resolve_order(Stage::IncomingPhysical, &nodes).unwrap_err();
        assert_eq!(
            err,
            PipelineConfigurationError::MissingDependency {
                step_id: "Audit".to_string(),
                dependency: "Nope".to_string(),
                direction: DependencyDirection::After,
                stage: Stage::IncomingPhysical,
            }
        );
    }

    #[test]
    fn test_cycle_reports_only_participating_steps() {
        let nodes = vec![
            Node::new("Head"),
            Node::new("A").before("B", true),
            Node::new("B").before("A", true),
            Node::new("Tail").after("A", true),
        ];
        let err = resolve_order(Stage::OutgoingLogical, &nodes).unwrap_err();
        match err {
            PipelineConfigurationError::DependencyCycle { stage, step_ids } => {
                assert_eq!(stage, Stage::OutgoingLogical);
                assert_eq!(step_ids, vec!["A", "B"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let nodes = vec![Node::new("Loop").before("Loop", true)];
        let err = resolve_order(Stage::Dispatch, &nodes).unwrap_err();
        assert_eq!(err.step_ids(), vec!["Loop"]);
    }

    #[test]
    fn test_duplicate_constraints_are_harmless() {
        let nodes = vec![
            Node::new("B"),
            Node::new("A").before("B", true).before("B", false),
            Node::new("C").after("A", true),
        ];
        let order = resolve_order(Stage::IncomingPhysical, &nodes).unwrap();
        assert_eq!(ids(&nodes, &order), vec!["A", "B", "C"]);
    }
}
