//! Directed acyclic graph over resource keys.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::error::GraphError;
use crate::model::ResourceKey;

/// Dependency graph over resource instances.
///
/// Edges point from a dependency to its dependent, so incoming neighbours
/// are the nodes a resource waits for. `index` keeps node lookup and
/// iteration in key order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ResourceKey, ()>,
    index: BTreeMap<ResourceKey, NodeIndex>,
}

/// DFS visit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current recursion stack.
    Active,
    /// Fully explored.
    Done,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from nodes and `(dependent, dependency)` edges.
    ///
    /// # Errors
    ///
    /// Returns an error if an edge names a node that is not in `nodes`.
    pub fn build(
        nodes: impl IntoIterator<Item = ResourceKey>,
        edges: impl IntoIterator<Item = (ResourceKey, ResourceKey)>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node);
        }
        for (dependent, dependency) in edges {
            graph.add_edge(&dependent, &dependency)?;
        }
        Ok(graph)
    }

    /// Adds a node (no-op if already present).
    pub fn add_node(&mut self, key: ResourceKey) {
        if !self.index.contains_key(&key) {
            let idx = self.graph.add_node(key.clone());
            self.index.insert(key, idx);
        }
    }

    /// Adds an edge meaning "`dependency` must complete before `dependent`".
    ///
    /// # Errors
    ///
    /// Returns an error if either node is unknown.
    pub fn add_edge(&mut self, dependent: &ResourceKey, dependency: &ResourceKey) -> Result<(), GraphError> {
        let from = self.node(dependency)?;
        let to = self.node(dependent)?;
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    fn node(&self, key: &ResourceKey) -> Result<NodeIndex, GraphError> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode { key: key.clone() })
    }

    /// Returns true if the node exists.
    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterates nodes in key order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceKey> {
        self.index.keys()
    }

    fn neighbors(&self, idx: NodeIndex, direction: Direction) -> BTreeSet<&ResourceKey> {
        self.graph
            .neighbors_directed(idx, direction)
            .map(|n| &self.graph[n])
            .collect()
    }

    /// Returns the direct dependencies of a node.
    #[must_use]
    pub fn dependencies_of(&self, key: &ResourceKey) -> Option<BTreeSet<ResourceKey>> {
        let idx = self.index.get(key)?;
        Some(self.neighbors(*idx, Direction::Incoming).into_iter().cloned().collect())
    }

    /// Returns the direct dependents of a node.
    #[must_use]
    pub fn dependents_of(&self, key: &ResourceKey) -> Option<BTreeSet<ResourceKey>> {
        let idx = self.index.get(key)?;
        Some(self.neighbors(*idx, Direction::Outgoing).into_iter().cloned().collect())
    }

    /// Returns every node that directly or indirectly depends on `key`.
    #[must_use]
    pub fn transitive_dependents(&self, key: &ResourceKey) -> BTreeSet<ResourceKey> {
        let mut seen = BTreeSet::new();
        let Some(start) = self.index.get(key) else {
            return seen;
        };
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([*start]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if seen.insert(self.graph[dependent].clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        seen
    }

    /// Searches for a cycle using depth-first search with a recursion stack.
    ///
    /// Returns the cycle in dependency order with its first node repeated at
    /// the end (`a -> b -> a` for "a depends on b depends on a").
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<ResourceKey>> {
        if !petgraph::algo::is_cyclic_directed(&self.graph) {
            return None;
        }

        let mut marks: BTreeMap<&ResourceKey, Mark> = BTreeMap::new();
        let mut stack: Vec<&ResourceKey> = Vec::new();

        for start in self.index.keys() {
            if marks.contains_key(start) {
                continue;
            }
            if let Some(cycle) = self.visit(start, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }

        None
    }

    fn visit<'a>(
        &'a self,
        node: &'a ResourceKey,
        marks: &mut BTreeMap<&'a ResourceKey, Mark>,
        stack: &mut Vec<&'a ResourceKey>,
    ) -> Option<Vec<ResourceKey>> {
        marks.insert(node, Mark::Active);
        stack.push(node);

        let dependencies = self
            .index
            .get(node)
            .map(|idx| self.neighbors(*idx, Direction::Incoming))
            .unwrap_or_default();

        for next in dependencies {
            match marks.get(next) {
                Some(Mark::Active) => {
                    let start = stack.iter().position(|k| *k == next).unwrap_or(0);
                    let mut cycle: Vec<ResourceKey> =
                        stack[start..].iter().map(|k| (*k).clone()).collect();
                    cycle.push(next.clone());
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = self.visit(next, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    /// Fails with the cycle path if the graph is not acyclic.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] naming every resource on the cycle.
    pub fn ensure_acyclic(&self) -> Result<(), GraphError> {
        match self.find_cycle() {
            Some(path) => Err(GraphError::Cycle { path }),
            None => Ok(()),
        }
    }

    /// Partitions nodes into topological layers.
    ///
    /// Layer `n` holds exactly the nodes whose dependencies all sit in
    /// layers `< n`. Keys are sorted within each layer.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] if the graph is cyclic.
    pub fn layers(&self) -> Result<Vec<Vec<ResourceKey>>, GraphError> {
        self.ensure_acyclic()?;

        let mut remaining: BTreeMap<NodeIndex, usize> = self
            .index
            .values()
            .map(|idx| {
                let count = self.graph.neighbors_directed(*idx, Direction::Incoming).count();
                (*idx, count)
            })
            .collect();

        let mut layers = Vec::new();
        let mut current: BTreeSet<&ResourceKey> = self
            .index
            .iter()
            .filter(|(_, idx)| remaining.get(*idx) == Some(&0))
            .map(|(key, _)| key)
            .collect();

        while !current.is_empty() {
            let mut next: BTreeSet<&ResourceKey> = BTreeSet::new();
            for key in &current {
                let Some(idx) = self.index.get(*key) else {
                    continue;
                };
                remaining.remove(idx);
                for dependent in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
                    if let Some(count) = remaining.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.insert(&self.graph[dependent]);
                        }
                    }
                }
            }

            layers.push(current.into_iter().cloned().collect());
            current = next;
        }

        debug!("Dependency graph: {} nodes in {} layers", self.len(), layers.len());
        Ok(layers)
    }

    /// Returns one valid topological order (layers flattened).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] if the graph is cyclic.
    pub fn topological_order(&self) -> Result<Vec<ResourceKey>, GraphError> {
        Ok(self.layers()?.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ResourceKey {
        s.parse().unwrap()
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        DependencyGraph::build(
            nodes.iter().map(|n| key(n)),
            edges.iter().map(|(a, b)| (key(a), key(b))),
        )
        .unwrap()
    }

    #[test]
    fn test_layers_respect_dependencies() {
        let g = graph(
            &["aws_vpc.main", "aws_subnet.a", "aws_subnet.b", "aws_instance.web"],
            &[
                ("aws_subnet.a", "aws_vpc.main"),
                ("aws_subnet.b", "aws_vpc.main"),
                ("aws_instance.web", "aws_subnet.a"),
            ],
        );

        let layers = g.layers().unwrap();
        assert_eq!(
            layers,
            vec![
                vec![key("aws_vpc.main")],
                vec![key("aws_subnet.a"), key("aws_subnet.b")],
                vec![key("aws_instance.web")],
            ]
        );
    }

    #[test]
    fn test_independent_nodes_share_first_layer() {
        let g = graph(&["aws_sqs_queue.a", "aws_sns_topic.b"], &[]);
        let layers = g.layers().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].len(), 2);
    }

    #[test]
    fn test_two_node_cycle_names_both() {
        let g = graph(
            &["aws_vpc.a", "aws_vpc.b"],
            &[("aws_vpc.a", "aws_vpc.b"), ("aws_vpc.b", "aws_vpc.a")],
        );

        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle, vec![key("aws_vpc.a"), key("aws_vpc.b"), key("aws_vpc.a")]);
        assert!(matches!(g.layers(), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_cycle_path_lists_only_cycle_members() {
        let g = graph(
            &["x_r.entry", "x_r.a", "x_r.b", "x_r.c"],
            &[
                ("x_r.entry", "x_r.a"),
                ("x_r.a", "x_r.b"),
                ("x_r.b", "x_r.c"),
                ("x_r.c", "x_r.a"),
            ],
        );

        let cycle = g.find_cycle().unwrap();
        assert_eq!(
            cycle,
            vec![key("x_r.a"), key("x_r.b"), key("x_r.c"), key("x_r.a")]
        );
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let g = graph(
            &["x_r.top", "x_r.left", "x_r.right", "x_r.bottom"],
            &[
                ("x_r.left", "x_r.top"),
                ("x_r.right", "x_r.top"),
                ("x_r.bottom", "x_r.left"),
                ("x_r.bottom", "x_r.right"),
            ],
        );

        assert!(g.find_cycle().is_none());
        let order = g.topological_order().unwrap();
        let pos = |k: &str| order.iter().position(|o| *o == key(k)).unwrap();
        assert!(pos("x_r.top") < pos("x_r.left"));
        assert!(pos("x_r.left") < pos("x_r.bottom"));
        assert!(pos("x_r.right") < pos("x_r.bottom"));
    }

    #[test]
    fn test_unknown_edge_endpoint_is_rejected() {
        let result = DependencyGraph::build([key("x_r.a")], [(key("x_r.a"), key("x_r.ghost"))]);
        assert!(matches!(result, Err(GraphError::UnknownNode { .. })));
    }

    #[test]
    fn test_transitive_dependents() {
        let g = graph(
            &["x_r.a", "x_r.b", "x_r.c", "x_r.d"],
            &[("x_r.b", "x_r.a"), ("x_r.c", "x_r.b")],
        );

        let dependents = g.transitive_dependents(&key("x_r.a"));
        assert_eq!(dependents, [key("x_r.b"), key("x_r.c")].into_iter().collect());
        assert!(g.transitive_dependents(&key("x_r.d")).is_empty());
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_direct_neighbours_and_duplicate_edges() {
        let mut g = graph(
            &["aws_vpc.main", "aws_subnet.a", "aws_instance.web"],
            &[("aws_subnet.a", "aws_vpc.main"), ("aws_instance.web", "aws_subnet.a")],
        );
        g.add_edge(&key("aws_subnet.a"), &key("aws_vpc.main")).unwrap();

        assert_eq!(g.edge_count(), 2);
        assert_eq!(
            g.dependencies_of(&key("aws_subnet.a")).unwrap(),
            [key("aws_vpc.main")].into_iter().collect()
        );
        assert_eq!(
            g.dependents_of(&key("aws_subnet.a")).unwrap(),
            [key("aws_instance.web")].into_iter().collect()
        );
        assert!(g.dependencies_of(&key("aws_vpc.main")).unwrap().is_empty());
        assert!(g.dependencies_of(&key("aws_vpc.ghost")).is_none());
        assert_eq!(
            g.nodes().cloned().collect::<Vec<_>>(),
            vec![key("aws_instance.web"), key("aws_subnet.a"), key("aws_vpc.main")]
        );
    }
}
