// src/dag/graph.rs

use std::collections::HashMap;

use crate::config::model::Dag;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Steps that must finish before this one can run.
    deps: Vec<String>,
    /// Steps that list this one in their `after`.
    dependents: Vec<String>,
}

/// Adjacency view of a validated DAG, keyed by step name.
///
/// Acyclicity and reference checks already happened in `config::validate`;
/// this only answers neighbourhood questions for the scheduler.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<String, DagNode>,
    /// Step names in definition (topological) order.
    order: Vec<String>,
}

impl DagGraph {
    pub fn from_dag(dag: &Dag) -> Self {
        let mut nodes: HashMap<String, DagNode> = dag
            .steps
            .iter()
            .map(|step| {
                (
                    step.name.clone(),
                    DagNode {
                        deps: step.after.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for step in &dag.steps {
            for dep in &step.after {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(step.name.clone());
                }
            }
        }

        Self {
            nodes,
            order: dag.steps.iter().map(|s| s.name.clone()).collect(),
        }
    }

    /// Step names in topological order.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Steps without dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.steps()
            .filter(|name| self.dependencies_of(name).is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Step;

    #[test]
    fn adjacency_and_roots() {
        let dag = Dag::new_unchecked(
            "g",
            "/defs/g.toml",
            vec![
                Step::new("a", "true"),
                Step::new("b", "true"),
                Step::new("c", "true").after("a").after("b"),
            ],
        );
        let graph = DagGraph::from_dag(&dag);

        assert_eq!(graph.roots(), vec!["a", "b"]);
        assert_eq!(graph.dependencies_of("c"), ["a".to_string(), "b".to_string()]);
        assert_eq!(graph.dependents_of("a"), ["c".to_string()]);
        assert!(graph.dependents_of("c").is_empty());
        assert!(graph.dependencies_of("missing").is_empty());
    }
}
