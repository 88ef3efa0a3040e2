// Graph - a rooted expression plus its variable bindings
//
// A Graph owns:
//
//   root      the node whose value is the graph's value
//   bindings  name -> node; Variable nodes reachable from the root resolve
//             here (rebinding a name replaces the previous node)
//   registry  every node reachable from the root through operands, each
//             listed once, collected when the graph is built
//
// Graphs are handles too: cloning shares the same bindings. A nested-graph
// node holds such a handle and evaluates the inner root with the inner
// bindings in scope.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::node::{Node, NodeId, NodeKind};

struct GraphInner {
    name: String,
    root: Node,
    vars: RefCell<HashMap<String, Node>>,
    nodes: Vec<Node>,
}

/// Handle to a named expression graph.
#[derive(Clone)]
pub struct Graph {
    inner: Rc<GraphInner>,
}

impl Graph {
    /// Build a graph around `root` and register every node reachable from it.
    pub fn new(name: impl Into<String>, root: &Node) -> Self {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id()) {
                continue;
            }
            stack.extend(node.inputs().into_iter().rev().cloned());
            nodes.push(node);
        }
        Graph {
            inner: Rc::new(GraphInner {
                name: name.into(),
                root: root.clone(),
                vars: RefCell::new(HashMap::new()),
                nodes,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn root(&self) -> &Node {
        &self.inner.root
    }

    /// Bind `name` to `node`, replacing any previous binding.
    pub fn bind(&self, name: impl Into<String>, node: &Node) {
        self.inner
            .vars
            .borrow_mut()
            .insert(name.into(), node.clone());
    }

    /// Remove the binding of `name`, returning the node it held.
    pub fn unbind(&self, name: &str) -> Option<Node> {
        self.inner.vars.borrow_mut().remove(name)
    }

    /// Node bound under `name`.
    pub fn var(&self, name: &str) -> Option<Node> {
        self.inner.vars.borrow().get(name).cloned()
    }

    /// Names currently bound, sorted.
    pub fn var_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.vars.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered nodes, root first, each listed once.
    pub fn nodes(&self) -> &[Node] {
        &self.inner.nodes
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.inner.nodes.iter().any(|n| n == node)
    }

    /// Reset the gradient of every node a backward pass would reach.
    pub fn zero_grad(&self) {
        for (node, _) in topo_order(self) {
            node.zero_grad();
        }
    }

    /// Teardown: drop the result and gradient of every registered node.
    pub fn release(&self) {
        tracing::debug!(graph = self.name(), nodes = self.inner.nodes.len(), "release graph");
        for node in &self.inner.nodes {
            node.release();
        }
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("vars", &self.var_names())
            .field("nodes", &self.inner.nodes.len())
            .finish()
    }
}

/// Topological order of everything a pass over `graph` touches, leaves
/// first, root last, each node paired with the graph whose bindings were in
/// scope when it was first reached.
///
/// Edges run from a node to its operands, from a Variable to the node bound
/// under its name, and from a nested-graph node to its parameter nodes
/// (with the inner graph in scope). The inner expression itself is not
/// listed: the autograd engine walks it per nested-graph node.
pub(crate) fn topo_order(graph: &Graph) -> Vec<(Node, Graph)> {
    fn visit(
        node: &Node,
        scope: &Graph,
        visited: &mut HashSet<NodeId>,
        order: &mut Vec<(Node, Graph)>,
    ) {
        if !visited.insert(node.id()) {
            return;
        }
        match node.kind() {
            NodeKind::Variable { name } => {
                if let Some(bound) = scope.var(name) {
                    visit(&bound, scope, visited, order);
                }
            }
            NodeKind::Graph { graph, params } => {
                for (param, _) in params {
                    visit(param, graph, visited, order);
                }
            }
            _ => {
                for input in node.inputs() {
                    visit(input, scope, visited, order);
                }
            }
        }
        order.push((node.clone(), scope.clone()));
    }

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(graph.root(), graph, &mut visited, &mut order);
    order
}
