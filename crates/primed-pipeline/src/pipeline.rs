use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ops::Add;

use primed_types::{PrimedError, Result};

use crate::node::Node;

/// A validated DAG of nodes, stored in topological order.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    nodes: Vec<Node>,
}

impl Pipeline {
    /// Build a pipeline from `nodes`.
    ///
    /// Fails when two nodes share a name, when a dataset has more than one
    /// producer, or when the nodes form a cycle.
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for node in &nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(PrimedError::PipelineError(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        let mut producers: HashMap<&str, &str> = HashMap::new();
        for node in &nodes {
            for output in &node.outputs {
                if let Some(other) = producers.insert(output.as_str(), node.name.as_str()) {
                    return Err(PrimedError::PipelineError(format!(
                        "dataset '{output}' is produced by both '{other}' and '{}'",
                        node.name
                    )));
                }
            }
        }

        let order = topological_order(&nodes, &producers)?;
        let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
        let nodes = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        Ok(Self { nodes })
    }

    /// Concatenate pipelines. Nodes with the same name are kept once.
    pub fn concat(pipelines: impl IntoIterator<Item = Pipeline>) -> Result<Self> {
        let mut names = BTreeSet::new();
        let mut nodes = Vec::new();
        for pipeline in pipelines {
            for node in pipeline.nodes {
                if names.insert(node.name.clone()) {
                    nodes.push(node);
                }
            }
        }
        Self::new(nodes)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Datasets consumed by some node and produced by none.
    pub fn inputs(&self) -> BTreeSet<String> {
        let produced = self.all_outputs();
        self.nodes
            .iter()
            .flat_map(|n| n.inputs.iter())
            .filter(|name| !produced.contains(*name))
            .cloned()
            .collect()
    }

    /// Datasets produced by some node and consumed by none.
    pub fn outputs(&self) -> BTreeSet<String> {
        let consumed: BTreeSet<&String> = self.nodes.iter().flat_map(|n| n.inputs.iter()).collect();
        self.nodes
            .iter()
            .flat_map(|n| n.outputs.iter())
            .filter(|name| !consumed.contains(name))
            .cloned()
            .collect()
    }

    /// Every dataset produced by some node, intermediate ones included.
    pub fn all_outputs(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .flat_map(|n| n.outputs.iter())
            .cloned()
            .collect()
    }

    /// Every dataset the pipeline touches.
    pub fn datasets(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .flat_map(|n| n.inputs.iter().chain(n.outputs.iter()))
            .cloned()
            .collect()
    }

    /// Distinct node namespaces, `None` first.
    pub fn namespaces(&self) -> BTreeSet<Option<String>> {
        self.nodes.iter().map(|n| n.namespace.clone()).collect()
    }

    /// Sub-pipeline of the nodes whose namespace is exactly `namespace`.
    /// `None` selects the nodes outside any namespace.
    pub fn filter(&self, namespace: Option<&str>) -> Pipeline {
        Pipeline {
            nodes: self
                .nodes
                .iter()
                .filter(|n| n.namespace.as_deref() == namespace)
                .cloned()
                .collect(),
        }
    }
}

impl Add for Pipeline {
    type Output = Result<Pipeline>;

    fn add(self, other: Pipeline) -> Self::Output {
        Pipeline::concat([self, other])
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Kahn's algorithm. Ties are broken by declaration order so the result is
/// deterministic.
fn topological_order(nodes: &[Node], producers: &HashMap<&str, &str>) -> Result<Vec<usize>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.name.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (i, node) in nodes.iter().enumerate() {
        let upstream: BTreeSet<usize> = node
            .inputs
            .iter()
            .filter_map(|input| producers.get(input.as_str()))
            .filter_map(|producer| index.get(producer).copied())
            .collect();
        in_degree[i] = upstream.len();
        for u in upstream {
            dependents.entry(u).or_default().insert(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        if let Some(next) = dependents.get(&i) {
            for &d in next {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.push_back(d);
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = (0..nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].name.as_str())
            .collect();
        return Err(PrimedError::PipelineError(format!(
            "cycle detected between nodes: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn pass(name: &str, inputs: &[&str], outputs: &[&str]) -> Node {
        let n = outputs.len();
        Node::new(
            name,
            inputs.iter().copied(),
            outputs.iter().copied(),
            move |_: &[Value]| Ok(vec![json!(null); n]),
        )
    }

    fn names(pipeline: &Pipeline) -> Vec<&str> {
        pipeline.nodes().iter().map(|n| n.name.as_str()).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sorts_nodes_topologically() {
        let pipeline = Pipeline::new(vec![
            pass("cube", &["D"], &["E", "F"]),
            pass("square", &["C"], &["D"]),
            pass("identity", &["A", "params:B"], &["C"]),
        ])
        .unwrap();
        assert_eq!(names(&pipeline), vec!["identity", "square", "cube"]);
    }

    #[test]
    fn free_inputs_and_outputs() {
        let pipeline = Pipeline::new(vec![
            pass("identity", &["A", "params:B"], &["C"]),
            pass("square", &["C"], &["D"]),
            pass("cube", &["D"], &["E", "F"]),
        ])
        .unwrap();
        assert_eq!(pipeline.inputs(), set(&["A", "params:B"]));
        assert_eq!(pipeline.outputs(), set(&["E", "F"]));
        assert_eq!(pipeline.all_outputs(), set(&["C", "D", "E", "F"]));
        assert_eq!(
            pipeline.datasets(),
            set(&["A", "C", "D", "E", "F", "params:B"])
        );
    }

    #[test]
    fn rejects_duplicate_producers() {
        let err = Pipeline::new(vec![pass("a", &[], &["X"]), pass("b", &[], &["X"])]).unwrap_err();
        match err {
            PrimedError::PipelineError(msg) => {
                assert_eq!(msg, "dataset 'X' is produced by both 'a' and 'b'")
            }
            other => panic!("expected PipelineError, got: {other:?}"),
        }
    }

    #[test]
    fn rejects_cycles() {
        let err = Pipeline::new(vec![pass("a", &["Y"], &["X"]), pass("b", &["X"], &["Y"])]).unwrap_err();
        assert!(err.to_string().contains("cycle detected between nodes: a, b"));
    }

    #[test]
    fn rejects_duplicate_node_names() {
        let err = Pipeline::new(vec![pass("a", &[], &["X"]), pass("a", &[], &["Y"])]).unwrap_err();
        assert!(matches!(err, PrimedError::PipelineError(_)));
    }

    #[test]
    fn filter_and_namespaces() {
        let pipeline = Pipeline::new(vec![
            pass("root", &["A"], &["B"]),
            pass("n1.step", &["n1.A"], &["n1.B"]).with_namespace("n1"),
            pass("n2.step", &["n2.A"], &["n2.B"]).with_namespace("n2"),
        ])
        .unwrap();
        assert_eq!(
            pipeline.namespaces().into_iter().collect::<Vec<_>>(),
            vec![None, Some("n1".to_string()), Some("n2".to_string())]
        );
        assert_eq!(names(&pipeline.filter(None)), vec!["root"]);
        assert_eq!(names(&pipeline.filter(Some("n1"))), vec!["n1.step"]);
        assert!(pipeline.filter(Some("n3")).is_empty());
    }

    #[test]
    fn add_deduplicates_by_node_name() {
        let a = Pipeline::new(vec![pass("x", &["A"], &["B"])]).unwrap();
        let b = Pipeline::new(vec![pass("x", &["A"], &["B"]), pass("y", &["B"], &["C"])]).unwrap();
        let combined = (a + b).unwrap();
        assert_eq!(names(&combined), vec!["x", "y"]);
    }
}
