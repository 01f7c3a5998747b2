//! Clustering of alignment scores: cognate sets, UPGMA and neighbor joining.

use ahash::AHashMap;
use ndarray::{s, Array2};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rayon::prelude::*;

use crate::types::{CognateSet, SimilarityEdge};

/// Union-Find over `0..n`
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Find root with path halving
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Union by rank
    pub fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return;
        }

        match self.rank[root_x].cmp(&self.rank[root_y]) {
            std::cmp::Ordering::Less => self.parent[root_x] = root_y,
            std::cmp::Ordering::Greater => self.parent[root_y] = root_x,
            std::cmp::Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
    }

    /// Connected components, each in ascending order, ordered by their
    /// smallest element.
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let mut index_of_root: AHashMap<usize, usize> = AHashMap::new();
        let mut components: Vec<Vec<usize>> = Vec::new();

        for i in 0..self.parent.len() {
            let root = self.find(i);
            let index = *index_of_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[index].push(i);
        }

        components
    }
}

/// Cognate sets: connected components of the words linked by an edge of
/// weight at or above `threshold`. Words only seen on weaker edges form
/// singleton sets. Members are sorted; sets are ordered by first member.
pub fn cognate_sets(edges: Vec<SimilarityEdge>, threshold: f64) -> Vec<CognateSet> {
    let mut ids: Vec<String> = edges
        .iter()
        .flat_map(|e| [e.source.clone(), e.target.clone()])
        .collect();
    ids.sort();
    ids.dedup();

    let mut uf = UnionFind::new(ids.len());
    for edge in edges.iter().filter(|e| e.weight.0 >= threshold) {
        if let (Ok(i), Ok(j)) = (ids.binary_search(&edge.source), ids.binary_search(&edge.target)) {
            uf.union(i, j);
        }
    }

    uf.components()
        .into_iter()
        .enumerate()
        .map(|(id, members)| CognateSet::new(id, members.into_iter().map(|i| ids[i].clone()).collect()))
        .collect()
}

/// Pairwise distance matrix, upper triangle computed in parallel.
fn distance_matrix<T, F>(items: &[T], distance: F) -> Array2<f64>
where
    T: Sync,
    F: Fn(&T, &T) -> f64 + Sync,
{
    let n = items.len();
    let mut matrix = Array2::<f64>::zeros((n, n));

    let pairs: Vec<_> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect();

    let distances: Vec<_> = pairs
        .par_iter()
        .map(|&(i, j)| distance(&items[i], &items[j]))
        .collect();

    for (&(i, j), d) in pairs.iter().zip(distances) {
        matrix[[i, j]] = d;
        matrix[[j, i]] = d;
    }

    matrix
}

/// Flat UPGMA: agglomerate while the closest pair of clusters is strictly
/// closer than `threshold`.
///
/// The closest pair is the first minimum in row-major order. The merged
/// cluster goes after the remaining ones, and its distance to any other
/// cluster is the mean of the two merged distances.
pub fn flat_upgma<T, F>(items: &[T], distance: F, threshold: f64) -> Vec<Vec<T>>
where
    T: Clone + Sync,
    F: Fn(&T, &T) -> f64 + Sync,
{
    let matrix = distance_matrix(items, distance);
    let mut clusters: Vec<Vec<usize>> = (0..items.len()).map(|i| vec![i]).collect();
    let mut distances: Vec<Vec<f64>> = matrix.outer_iter().map(|row| row.to_vec()).collect();

    while clusters.len() > 1 {
        let mut closest: Option<(usize, usize, f64)> = None;
        for i in 0..clusters.len() {
            for j in i + 1..clusters.len() {
                let d = distances[i][j];
                if closest.map_or(true, |(_, _, min)| d < min) {
                    closest = Some((i, j, d));
                }
            }
        }
        let Some((i, j, d)) = closest else { break };
        if d >= threshold {
            break;
        }

        let merged_distances: Vec<f64> = (0..clusters.len())
            .filter(|&k| k != i && k != j)
            .map(|k| (distances[i][k] + distances[j][k]) / 2.0)
            .collect();

        let second = clusters.remove(j);
        let mut first = clusters.remove(i);
        first.extend(second);
        for row in distances.iter_mut() {
            row.remove(j);
            row.remove(i);
        }
        distances.remove(j);
        distances.remove(i);

        for (row, &d) in distances.iter_mut().zip(&merged_distances) {
            row.push(d);
        }
        let mut last = merged_distances;
        last.push(0.0);
        distances.push(last);
        clusters.push(first);
    }

    clusters
        .into_iter()
        .map(|members| members.into_iter().map(|i| items[i].clone()).collect())
        .collect()
}

/// Node of a UPGMA dendrogram.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterNode<T> {
    Leaf(T),
    /// Internal node at half the distance between its children.
    Merge { height: f64 },
}

/// UPGMA tree: edges run from parent to child and carry the branch length.
#[derive(Debug, Clone)]
pub struct Dendrogram<T> {
    pub graph: DiGraph<ClusterNode<T>, f64>,
    pub root: Option<NodeIndex>,
}

impl<T> Dendrogram<T> {
    pub fn height(&self, node: NodeIndex) -> f64 {
        match self.graph[node] {
            ClusterNode::Leaf(_) => 0.0,
            ClusterNode::Merge { height } => height,
        }
    }
}

/// Full UPGMA: merge the closest clusters until one remains, averaging
/// distances weighted by cluster size.
pub fn upgma_tree<T, F>(items: &[T], distance: F) -> Dendrogram<T>
where
    T: Clone + Sync,
    F: Fn(&T, &T) -> f64 + Sync,
{
    let mut distances = distance_matrix(items, distance);
    let mut graph = DiGraph::new();
    // (node, size) per live cluster; matrix rows of merged clusters are reused
    let mut live: Vec<Option<(NodeIndex, usize)>> = items
        .iter()
        .map(|item| Some((graph.add_node(ClusterNode::Leaf(item.clone())), 1)))
        .collect();

    let mut dendrogram_root = live.first().copied().flatten().map(|(node, _)| node);
    for _ in 1..items.len() {
        let mut closest: Option<(usize, usize, f64)> = None;
        for i in 0..live.len() {
            for j in i + 1..live.len() {
                if live[i].is_none() || live[j].is_none() {
                    continue;
                }
                let d = distances[[i, j]];
                if closest.map_or(true, |(_, _, min)| d < min) {
                    closest = Some((i, j, d));
                }
            }
        }
        let Some((i, j, d)) = closest else { break };
        let (Some((node_i, size_i)), Some((node_j, size_j))) = (live[i], live[j]) else {
            break;
        };

        let height = d / 2.0;
        let parent = graph.add_node(ClusterNode::Merge { height });
        for child in [node_i, node_j] {
            let child_height = match graph[child] {
                ClusterNode::Leaf(_) => 0.0,
                ClusterNode::Merge { height } => height,
            };
            graph.add_edge(parent, child, height - child_height);
        }

        let total = (size_i + size_j) as f64;
        for k in 0..live.len() {
            if k != i && k != j && live[k].is_some() {
                let merged = (distances[[i, k]] * size_i as f64 + distances[[j, k]] * size_j as f64) / total;
                distances[[i, k]] = merged;
                distances[[k, i]] = merged;
            }
        }
        live[i] = Some((parent, size_i + size_j));
        live[j] = None;
        dendrogram_root = Some(parent);
    }

    Dendrogram {
        graph,
        root: dendrogram_root,
    }
}

/// Unrooted tree: leaves carry their item, internal nodes `None`, edges the
/// branch length.
pub type UnrootedTree<T> = UnGraph<Option<T>, f64>;

/// Neighbor joining over `items`. Node `i` is the leaf of `items[i]`.
///
/// The pair minimizing `(k - 2) d(a, b) - r(a) - r(b)` is joined first (first
/// minimum in row-major order); negative branch lengths are clamped to zero.
/// The last two clusters are joined directly.
pub fn neighbor_joining<T, F>(items: &[T], distance: F) -> UnrootedTree<T>
where
    T: Clone + Sync,
    F: Fn(&T, &T) -> f64 + Sync,
{
    let n = items.len();
    let leaf_distances = distance_matrix(items, distance);
    let mut tree = UnGraph::with_capacity(2 * n, 2 * n);
    let mut clusters: Vec<NodeIndex> = items.iter().map(|item| tree.add_node(Some(item.clone()))).collect();

    // indexed by node; internal nodes append rows as they are created
    let size = (2 * n).max(1);
    let mut d = Array2::<f64>::zeros((size, size));
    d.slice_mut(s![..n, ..n]).assign(&leaf_distances);

    while clusters.len() > 2 {
        let k = clusters.len();
        let r: Vec<f64> = clusters
            .iter()
            .map(|&c| clusters.iter().filter(|&&o| o != c).map(|&o| d[[c.index(), o.index()]]).sum())
            .collect();

        let mut closest: Option<(usize, usize, f64)> = None;
        for i in 0..k {
            for j in i + 1..k {
                let q = (k - 2) as f64 * d[[clusters[i].index(), clusters[j].index()]] - r[i] - r[j];
                if closest.map_or(true, |(_, _, min)| q < min) {
                    closest = Some((i, j, q));
                }
            }
        }
        let Some((i, j, _)) = closest else { break };

        let (a, b) = (clusters[i], clusters[j]);
        let d_ab = d[[a.index(), b.index()]];
        let length_a = d_ab / 2.0 + (r[i] - r[j]) / (2.0 * (k - 2) as f64);
        let length_b = d_ab - length_a;

        let joined = tree.add_node(None);
        tree.add_edge(joined, a, length_a.max(0.0));
        tree.add_edge(joined, b, length_b.max(0.0));

        clusters.remove(j);
        clusters.remove(i);
        for &c in &clusters {
            let dist = (d[[a.index(), c.index()]] + d[[b.index(), c.index()]] - d_ab) / 2.0;
            d[[joined.index(), c.index()]] = dist;
            d[[c.index(), joined.index()]] = dist;
        }
        clusters.push(joined);
    }

    if let [a, b] = *clusters.as_slice() {
        tree.add_edge(a, b, d[[a.index(), b.index()]]);
    }
    tree
}

/// Neighbors of `node` in edge insertion order, with branch lengths.
fn adjacent<T>(tree: &UnrootedTree<T>, node: NodeIndex) -> Vec<(NodeIndex, f64)> {
    let mut edges: Vec<(EdgeIndex, NodeIndex, f64)> = tree
        .edges(node)
        .map(|e| {
            let other = if e.source() == node { e.target() } else { e.source() };
            (e.id(), other, *e.weight())
        })
        .collect();
    edges.sort_by_key(|&(id, _, _)| id);
    edges.into_iter().map(|(_, other, length)| (other, length)).collect()
}

/// Farthest node from `node` away from `parent`: (distance, node, path of
/// `(from, to, length)` edges).
fn farthest<T>(
    tree: &UnrootedTree<T>,
    parent: Option<NodeIndex>,
    node: NodeIndex,
) -> (f64, NodeIndex, Vec<(NodeIndex, NodeIndex, f64)>) {
    let mut best = (0.0, node, Vec::new());
    for (child, length) in adjacent(tree, node) {
        if Some(child) == parent {
            continue;
        }
        let (depth, deepest, path) = farthest(tree, Some(node), child);
        if depth + length > best.0 {
            let mut full = Vec::with_capacity(path.len() + 1);
            full.push((node, child, length));
            full.extend(path);
            best = (depth + length, deepest, full);
        }
    }
    best
}

/// Tree rooted at a chosen node; edges run from parent to child.
#[derive(Debug, Clone)]
pub struct RootedTree<T> {
    pub graph: DiGraph<Option<T>, f64>,
    pub root: Option<NodeIndex>,
}

impl<T> RootedTree<T> {
    /// Children of `node` in insertion order, with branch lengths.
    pub fn children(&self, node: NodeIndex) -> Vec<(NodeIndex, f64)> {
        let mut edges: Vec<(EdgeIndex, NodeIndex, f64)> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.id(), e.target(), *e.weight()))
            .collect();
        edges.sort_by_key(|&(id, _, _)| id);
        edges.into_iter().map(|(_, child, length)| (child, length)).collect()
    }

    /// Number of items in the subtree under `node`, `node` included.
    pub fn item_count(&self, node: NodeIndex) -> usize {
        usize::from(self.graph[node].is_some())
            + self
                .children(node)
                .into_iter()
                .map(|(child, _)| self.item_count(child))
                .sum::<usize>()
    }
}

/// Root `tree` at the midpoint of its longest path.
///
/// When the midpoint falls inside an edge, a new item-less root splits it;
/// when it falls on a node (including trees of zero length), that node
/// becomes the root.
pub fn midpoint_root<T: Clone>(tree: &UnrootedTree<T>) -> RootedTree<T> {
    let mut rooted = RootedTree {
        graph: DiGraph::new(),
        root: None,
    };
    let Some(start) = tree.node_indices().next() else {
        return rooted;
    };

    let (_, end, _) = farthest(tree, None, start);
    let (length, _, path) = farthest(tree, None, end);
    let midpoint = length / 2.0;

    let mut first = end;
    let mut walked = 0.0;
    let mut split = None;
    for &(_, to, edge_length) in &path {
        walked += edge_length;
        if walked > midpoint {
            split = Some((to, edge_length, edge_length - (walked - midpoint)));
            break;
        }
        first = to;
    }

    match split {
        Some((other, edge_length, point)) if point > 0.0 => {
            let root = rooted.graph.add_node(None);
            let other_node = rooted.graph.add_node(tree[other].clone());
            rooted.graph.add_edge(root, other_node, edge_length - point);
            grow(tree, Some(first), other, other_node, &mut rooted.graph);
            let first_node = rooted.graph.add_node(tree[first].clone());
            rooted.graph.add_edge(root, first_node, point);
            grow(tree, Some(other), first, first_node, &mut rooted.graph);
            rooted.root = Some(root);
        }
        _ => {
            let root = rooted.graph.add_node(tree[first].clone());
            grow(tree, None, first, root, &mut rooted.graph);
            rooted.root = Some(root);
        }
    }
    rooted
}

fn grow<T: Clone>(
    tree: &UnrootedTree<T>,
    parent: Option<NodeIndex>,
    node: NodeIndex,
    rooted_node: NodeIndex,
    graph: &mut DiGraph<Option<T>, f64>,
) {
    for (child, length) in adjacent(tree, node) {
        if Some(child) == parent {
            continue;
        }
        let rooted_child = graph.add_node(tree[child].clone());
        graph.add_edge(rooted_node, rooted_child, length);
        grow(tree, Some(node), child, rooted_child, graph);
    }
}
