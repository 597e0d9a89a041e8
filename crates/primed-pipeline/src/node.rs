use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A node's computation: positional input values in, positional output values
/// out. Failures are reported as plain messages and attributed to the node by
/// the runner.
pub type NodeFn = Arc<dyn Fn(&[Value]) -> std::result::Result<Vec<Value>, String> + Send + Sync>;

/// One computation step of a pipeline.
#[derive(Clone)]
pub struct Node {
    pub name: String,
    pub namespace: Option<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub func: NodeFn,
}

impl Node {
    pub fn new<F>(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
        func: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Vec<Value>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            namespace: None,
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            func: Arc::new(func),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Invoke the node function and check the arity of its result.
    pub fn call(&self, inputs: &[Value]) -> std::result::Result<Vec<Value>, String> {
        let outputs = (self.func)(inputs)?;
        if outputs.len() != self.outputs.len() {
            return Err(format!(
                "expected {} output(s), function returned {}",
                self.outputs.len(),
                outputs.len()
            ));
        }
        Ok(outputs)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_checks_output_arity() {
        let node = Node::new("pair", ["x"], ["a", "b"], |args: &[Value]| {
            Ok(vec![args[0].clone()])
        });
        let err = node.call(&[json!(1)]).unwrap_err();
        assert_eq!(err, "expected 2 output(s), function returned 1");
    }

    #[test]
    fn call_passes_values_through() {
        let node = Node::new("double", ["x"], ["y"], |args: &[Value]| {
            let x = args[0].as_i64().ok_or("not an integer")?;
            Ok(vec![json!(x * 2)])
        });
        assert_eq!(node.call(&[json!(21)]).unwrap(), vec![json!(42)]);
        assert_eq!(node.call(&[json!("a")]).unwrap_err(), "not an integer");
    }

    #[test]
    fn with_namespace_sets_scope() {
        let node = Node::new("n", Vec::<String>::new(), ["y"], |_: &[Value]| Ok(vec![json!(0)]))
            .with_namespace("n1");
        assert_eq!(node.namespace.as_deref(), Some("n1"));
    }
}
