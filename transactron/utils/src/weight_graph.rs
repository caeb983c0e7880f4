use itertools::Itertools;
use petgraph::matrix_graph::{MatrixGraph, NodeIndex, UnMatrix, Zero};
use petgraph::unionfind::UnionFind;
use petgraph::visit::IntoEdgeReferences;
use std::{collections::HashMap, hash::Hash};

/// Index into a [WeightGraph]
pub type Idx = NodeIndex;

/// Edge weight used for the graph nodes
pub struct BoolIdx(bool);

impl From<bool> for BoolIdx {
    fn from(b: bool) -> Self {
        BoolIdx(b)
    }
}

impl Zero for BoolIdx {
    fn zero() -> Self {
        BoolIdx(false)
    }

    fn is_zero(&self) -> bool {
        !self.0
    }
}

/// An undirected graph whose edges are added using the node weights `T`
/// rather than petgraph's `NodeIndex`. Edges carry no weights.
///
/// Nodes remember their insertion order, and every query that returns nodes
/// returns them in that order, so results are deterministic.
pub struct WeightGraph<T> {
    /// Mapping from T to a unique identifier.
    pub index_map: HashMap<T, NodeIndex>,
    /// Nodes in insertion order, indexed by `NodeIndex::index()`.
    nodes: Vec<T>,
    /// Graph representating using identifier.
    pub graph: UnMatrix<(), BoolIdx>,
}

impl<T: Eq + Hash + Clone> Default for WeightGraph<T> {
    fn default() -> Self {
        WeightGraph {
            index_map: HashMap::new(),
            nodes: Vec::new(),
            graph: MatrixGraph::new_undirected(),
        }
    }
}

impl<T, C> From<C> for WeightGraph<T>
where
    T: Eq + Hash + Clone,
    C: Iterator<Item = T>,
{
    fn from(nodes: C) -> Self {
        let mut graph = WeightGraph::default();
        nodes.for_each(|node| graph.add_node(node));
        graph
    }
}

impl<'a, T> WeightGraph<T>
where
    T: 'a + Eq + Hash + Clone,
{
    /// Add an edge between `a` and `b`.
    #[inline(always)]
    pub fn add_edge(&mut self, a: &T, b: &T) {
        self.graph
            .update_edge(self.index_map[a], self.index_map[b], true.into());
    }

    /// Add edges between all given items.
    pub fn add_all_edges<C>(&mut self, items: C)
    where
        C: Iterator<Item = &'a T> + Clone,
    {
        items.tuple_combinations().for_each(|(src, dst)| {
            self.add_edge(src, dst);
        });
    }

    /// Checks if the node has already been added to the graph.
    #[inline(always)]
    pub fn contains_node(&self, node: &T) -> bool {
        self.index_map.contains_key(node)
    }

    /// Add a new node to the graph. Adding a node twice is a no-op.
    pub fn add_node(&mut self, node: T) {
        if self.index_map.contains_key(&node) {
            return;
        }
        let idx = self.graph.add_node(());
        debug_assert_eq!(idx.index(), self.nodes.len());
        self.index_map.insert(node.clone(), idx);
        self.nodes.push(node);
    }

    /// Whether there is an edge between `a` and `b`.
    pub fn has_edge(&self, a: &T, b: &T) -> bool {
        match (self.index_map.get(a), self.index_map.get(b)) {
            (Some(a), Some(b)) => self.graph.has_edge(*a, *b),
            _ => false,
        }
    }

    /// Returns an iterator over the nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter()
    }

    /// Neighbours of `node`, in insertion order.
    pub fn neighbors(&self, node: &T) -> Vec<&T> {
        let mut idxs = self
            .graph
            .neighbors(self.index_map[node])
            .map(|idx| idx.index())
            .collect_vec();
        idxs.sort_unstable();
        idxs.dedup();
        idxs.into_iter().map(|i| &self.nodes[i]).collect()
    }

    /// Return the degree of a given node (number of edges connected).
    pub fn degree(&self, node: &T) -> usize {
        self.neighbors(node).len()
    }

    /// Connected components of the graph. Each component lists its nodes in
    /// insertion order and components are ordered by their first node.
    pub fn components(&self) -> Vec<Vec<T>> {
        let mut uf = UnionFind::new(self.nodes.len());
        for (a, b, _) in self.graph.edge_references() {
            uf.union(a.index(), b.index());
        }
        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<T>> = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let root = uf.find(i);
            let comp = *by_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[comp].push(node.clone());
        }
        components
    }
}

impl<T: Eq + Hash + ToString + Clone> ToString for WeightGraph<T> {
    fn to_string(&self) -> String {
        let nodes = self
            .nodes
            .iter()
            .map(|key| {
                format!("  {} [label=\"{}\"];", key.to_string(), key.to_string())
            })
            .join("\n");
        let edges = self
            .graph
            .edge_references()
            .map(|(a_idx, b_idx, _)| {
                format!(
                    "  {} -- {};",
                    self.nodes[a_idx.index()].to_string(),
                    self.nodes[b_idx.index()].to_string()
                )
            })
            .join("\n");
        format!("graph {{ \n{}\n{}\n }}", nodes, edges)
    }
}
