//! Earth Engine expression graphs.
//!
//! [`Node`] is the tree the request builder assembles. [`Expression`] is its
//! wire form: a flat `values` map plus the key of the result. Function
//! definitions refer to their body by key, so bodies are hoisted into the map
//! during encoding.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A node in an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal JSON value
    Constant(Value),

    /// Call of a server-side algorithm with named arguments
    Invoke {
        function: String,
        arguments: BTreeMap<String, Node>,
    },

    /// Reference to an enclosing function's argument
    Argument(String),

    /// Lambda passed to algorithms such as `Collection.map`
    Function {
        argument_names: Vec<String>,
        body: Box<Node>,
    },
}

impl Node {
    pub fn constant(value: impl Into<Value>) -> Self {
        Node::Constant(value.into())
    }

    /// Invoke `function` with the given named arguments.
    pub fn call<K, I>(function: &str, arguments: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        Node::Invoke {
            function: function.to_string(),
            arguments: arguments.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Invoke `function` without arguments.
    pub fn call_no_args(function: &str) -> Self {
        Node::Invoke {
            function: function.to_string(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn argument(name: &str) -> Self {
        Node::Argument(name.to_string())
    }

    /// One-argument function whose body is built from a reference to that argument.
    pub fn lambda(argument: &str, body: impl FnOnce(Node) -> Node) -> Self {
        Node::Function {
            argument_names: vec![argument.to_string()],
            body: Box::new(body(Node::argument(argument))),
        }
    }

    /// Name of the invoked algorithm, if this node is an invocation.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Node::Invoke { function, .. } => Some(function),
            _ => None,
        }
    }

    /// Argument of an invocation by name.
    pub fn arg(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Invoke { arguments, .. } => arguments.get(name),
            _ => None,
        }
    }
}

/// Serialized value node as accepted by the REST API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueNode {
    ConstantValue(Value),
    FunctionInvocationValue(FunctionInvocationValue),
    ArgumentReference(String),
    FunctionDefinitionValue(FunctionDefinitionValue),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInvocationValue {
    pub function_name: String,
    pub arguments: BTreeMap<String, ValueNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinitionValue {
    pub argument_names: Vec<String>,
    /// Key of the body in the enclosing expression's `values`
    pub body: String,
}

/// A complete expression graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    pub values: BTreeMap<String, ValueNode>,
    pub result: String,
}

impl Expression {
    /// Flatten a tree into wire form.
    pub fn encode(root: &Node) -> Self {
        let mut values = BTreeMap::new();
        let root_value = encode_node(root, &mut values);
        let result = values.len().to_string();
        values.insert(result.clone(), root_value);
        Self { values, result }
    }
}

fn encode_node(node: &Node, values: &mut BTreeMap<String, ValueNode>) -> ValueNode {
    match node {
        Node::Constant(value) => ValueNode::ConstantValue(value.clone()),
        Node::Argument(name) => ValueNode::ArgumentReference(name.clone()),
        Node::Invoke { function, arguments } => {
            let arguments = arguments
                .iter()
                .map(|(name, arg)| (name.clone(), encode_node(arg, values)))
                .collect();
            ValueNode::FunctionInvocationValue(FunctionInvocationValue {
                function_name: function.clone(),
                arguments,
            })
        }
        Node::Function { argument_names, body } => {
            let body_value = encode_node(body, values);
            let key = values.len().to_string();
            values.insert(key.clone(), body_value);
            ValueNode::FunctionDefinitionValue(FunctionDefinitionValue {
                argument_names: argument_names.clone(),
                body: key,
            })
        }
    }
}
