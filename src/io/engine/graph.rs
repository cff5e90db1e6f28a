//! Dependency graph used to order imports.
//!
//! An arena of nodes with indegree counters and a ready queue. A node becomes
//! ready once every node it depends on has been marked done; ready nodes are
//! handed out in batches.

use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Index of a node in a [`DependencyGraph`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the raw index, equal to insertion order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Emitted,
    Done,
}

#[derive(Debug)]
struct Node {
    indegree: usize,
    dependencies: Vec<NodeId>,
    dependents: Vec<NodeId>,
    state: NodeState,
}

/// Dependency graph with batched topological traversal.
///
/// # Example
///
/// ```rust
/// use haul::io::engine::DependencyGraph;
///
/// let mut graph = DependencyGraph::new();
/// let author = graph.add_node();
/// let book = graph.add_node();
/// graph.add_dependency(book, author);
/// graph.prepare().expect("acyclic");
///
/// assert_eq!(graph.take_ready(), vec![author]);
/// graph.mark_done(author);
/// assert_eq!(graph.take_ready(), vec![book]);
/// graph.mark_done(book);
/// assert!(!graph.is_active());
/// ```
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    ready: VecDeque<NodeId>,
    remaining: usize,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            indegree: 0,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            state: NodeState::Pending,
        });
        self.ready.push_back(id);
        self.remaining += 1;
        id
    }

    /// Records that `node` cannot be processed before `dependency` is done.
    ///
    /// Repeated edges are ignored. Self-edges are kept and reported as a
    /// cycle by [`DependencyGraph::prepare`].
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) {
        if self.nodes[node.0].dependencies.contains(&dependency) {
            return;
        }
        self.nodes[node.0].dependencies.push(dependency);
        self.nodes[node.0].indegree += 1;
        self.nodes[dependency.0].dependents.push(node);
    }

    /// Checks the graph for cycles.
    ///
    /// # Errors
    ///
    /// Returns the members of one cycle, each depending on the next and the
    /// last on the first.
    pub fn prepare(&self) -> Result<(), Vec<NodeId>> {
        let mut indegree: Vec<usize> = self.nodes.iter().map(|n| n.indegree).collect();
        let mut queue: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&i| indegree[i] == 0)
            .map(NodeId)
            .collect();
        let mut visited = 0;
        while let Some(id) = queue.pop() {
            visited += 1;
            for dependent in &self.nodes[id.0].dependents {
                indegree[dependent.0] -= 1;
                if indegree[dependent.0] == 0 {
                    queue.push(*dependent);
                }
            }
        }
        if visited == self.nodes.len() {
            return Ok(());
        }
        Err(self.find_cycle(&indegree))
    }

    /// Walks dependencies among unvisited nodes until one repeats.
    fn find_cycle(&self, indegree: &[usize]) -> Vec<NodeId> {
        let Some(start) = (0..self.nodes.len()).find(|&i| indegree[i] > 0) else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut position = HashMap::new();
        let mut current = NodeId(start);
        loop {
            if let Some(&at) = position.get(&current) {
                return path.split_off(at);
            }
            position.insert(current, path.len());
            path.push(current);
            let next = self.nodes[current.0]
                .dependencies
                .iter()
                .find(|d| indegree[d.0] > 0);
            match next {
                Some(next) => current = *next,
                None => return path,
            }
        }
    }

    /// Hands out every pending node whose dependencies are all done, in
    /// insertion order. Each node is handed out once.
    pub fn take_ready(&mut self) -> Vec<NodeId> {
        let mut ready = Vec::with_capacity(self.ready.len());
        while let Some(id) = self.ready.pop_front() {
            let node = &mut self.nodes[id.0];
            // Queued nodes may have gained dependencies or been finished since.
            if node.state == NodeState::Pending && node.indegree == 0 {
                node.state = NodeState::Emitted;
                ready.push(id);
            }
        }
        ready.sort_unstable();
        ready
    }

    /// Marks a node done, releasing its dependents. Returns `false` if it
    /// was already done.
    pub fn mark_done(&mut self, id: NodeId) -> bool {
        if self.nodes[id.0].state == NodeState::Done {
            return false;
        }
        self.nodes[id.0].state = NodeState::Done;
        self.remaining -= 1;
        let dependents = std::mem::take(&mut self.nodes[id.0].dependents);
        for dependent in &dependents {
            let node = &mut self.nodes[dependent.0];
            if node.indegree == 0 {
                continue;
            }
            node.indegree -= 1;
            if node.indegree == 0 {
                self.ready.push_back(*dependent);
            }
        }
        self.nodes[id.0].dependents = dependents;
        true
    }

    /// Returns whether any node is not yet done.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Returns whether a node has been marked done.
    #[must_use]
    pub fn is_done(&self, id: NodeId) -> bool {
        self.nodes[id.0].state == NodeState::Done
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
