//! Graph topology: named nodes, one outgoing edge per node, and a
//! designated entry.
//!
//! ```ignore
//! let graph = GraphBuilder::new()
//!     .add_node("agent", model_node)
//!     .add_node("tools", tool_node)
//!     .set_entry("agent")
//!     .add_conditional_edge("agent", tools_condition("tools"), ["tools", END])
//!     .add_edge("tools", "agent")
//!     .compile()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::node::Node;
use crate::state::ConversationState;

/// Marker for the implicit start state.
pub const START: &str = "__start__";
/// Marker for the terminal state.
pub const END: &str = "__end__";

pub const DEFAULT_RECURSION_LIMIT: usize = steploop_core::config::DEFAULT_RECURSION_LIMIT;

/// Where execution goes next.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Node(String),
    End,
}

impl From<&str> for Route {
    fn from(name: &str) -> Self {
        if name == END {
            Route::End
        } else {
            Route::Node(name.to_string())
        }
    }
}

impl From<String> for Route {
    fn from(name: String) -> Self {
        if name == END {
            Route::End
        } else {
            Route::Node(name)
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Node(name) => f.write_str(name),
            Route::End => f.write_str(END),
        }
    }
}

/// Routing function of a conditional edge. Must be pure: no I/O, and the
/// same state always yields the same route.
pub type Router = Arc<dyn Fn(&ConversationState) -> Route + Send + Sync>;

/// The single outgoing edge of a node.
#[derive(Clone)]
pub(crate) enum Edge {
    Direct(Route),
    Conditional { router: Router, destinations: Vec<Route> },
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(route) => write!(f, "Direct({route})"),
            Edge::Conditional { destinations, .. } => f
                .debug_struct("Conditional")
                .field("destinations", destinations)
                .finish(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has no entry node")]
    MissingEntry,
    #[error("entry node set more than once")]
    DuplicateEntry,
    #[error("node '{0}' is registered more than once")]
    DuplicateNode(String),
    #[error("'{0}' is a reserved marker and cannot name a node")]
    ReservedName(String),
    #[error("edge references unknown node '{0}'")]
    UnknownNode(String),
    #[error("node '{0}' has more than one outgoing edge")]
    ConflictingEdges(String),
    #[error("node '{0}' has no outgoing edge; add an edge to END to make it terminal")]
    NoOutgoingEdge(String),
}

/// Collects nodes and edges; `compile` validates them.
pub struct GraphBuilder {
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
    recursion_limit: usize,
    /// First structural error seen while building, reported by `compile`.
    error: Option<GraphError>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            entry: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            error: None,
        }
    }

    fn fail(&mut self, error: GraphError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn add_node(self, name: impl Into<String>, node: impl Node + 'static) -> Self {
        self.add_node_arc(name, Arc::new(node))
    }

    pub fn add_node_arc(mut self, name: impl Into<String>, node: Arc<dyn Node>) -> Self {
        let name = name.into();
        if name == START || name == END {
            self.fail(GraphError::ReservedName(name));
        } else if self.nodes.contains_key(&name) {
            self.fail(GraphError::DuplicateNode(name));
        } else {
            self.order.push(name.clone());
            self.nodes.insert(name, node);
        }
        self
    }

    /// Unconditional edge. `to` may be [`END`]; `from` may be [`START`].
    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        if from == START {
            return self.set_entry(to);
        }
        self.insert_edge(from, Edge::Direct(Route::from(to)))
    }

    /// Conditional edge: `router` picks among `destinations` at runtime.
    pub fn add_conditional_edge<I, S>(self, from: impl Into<String>, router: Router, destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let destinations = destinations
            .into_iter()
            .map(|d| Route::from(d.into()))
            .collect();
        self.insert_edge(from.into(), Edge::Conditional { router, destinations })
    }

    fn insert_edge(mut self, from: String, edge: Edge) -> Self {
        if self.edges.contains_key(&from) {
            self.fail(GraphError::ConflictingEdges(from));
        } else {
            self.edges.insert(from, edge);
        }
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        if self.entry.is_some() {
            self.fail(GraphError::DuplicateEntry);
        } else {
            self.entry = Some(name.into());
        }
        self
    }

    /// Maximum node executions per run.
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }

        let known = |route: &Route| match route {
            Route::End => true,
            Route::Node(name) => self.nodes.contains_key(name),
        };

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.clone()));
            }
            let targets: &[Route] = match edge {
                Edge::Direct(route) => std::slice::from_ref(route),
                Edge::Conditional { destinations, .. } => destinations,
            };
            if let Some(Route::Node(missing)) = targets.iter().find(|r| !known(*r)) {
                return Err(GraphError::UnknownNode(missing.clone()));
            }
        }

        // Registration order keeps this error deterministic.
        if let Some(dangling) = self.order.iter().find(|n| !self.edges.contains_key(*n)) {
            return Err(GraphError::NoOutgoingEdge(dangling.clone()));
        }

        debug!(
            entry = %entry,
            nodes = self.nodes.len(),
            recursion_limit = self.recursion_limit,
            "graph compiled"
        );

        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            recursion_limit: self.recursion_limit,
            event_buffer: steploop_core::config::DEFAULT_EVENT_BUFFER,
        })
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated graph, ready to run. Runs are independent; one compiled graph
/// can serve many concurrent runs.
pub struct CompiledGraph {
    pub(crate) nodes: HashMap<String, Arc<dyn Node>>,
    pub(crate) edges: HashMap<String, Edge>,
    pub(crate) entry: String,
    pub(crate) recursion_limit: usize,
    pub(crate) event_buffer: usize,
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        f.debug_struct("CompiledGraph")
            .field("entry", &self.entry)
            .field("nodes", &nodes)
            .field("recursion_limit", &self.recursion_limit)
            .finish()
    }
}

impl CompiledGraph {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Channel capacity used by [`CompiledGraph::stream`].
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn node_names(&self) -> HashSet<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }
}
