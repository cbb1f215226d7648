//! K-d tree over a snapshot of a [`LabeledDataset`].
//!
//! Nodes live in a flat arena and refer to their children by index. Every
//! leaf holds exactly one point of the snapshot, so a tree over `n` points
//! has `2n - 1` nodes.
//!
//! Construction splits on the axis of greatest spread at the median; points
//! are ordered by `(coordinate, insertion index)` so identical inputs always
//! produce identical trees. Queries run a branch-and-bound descent with a
//! bounded max-heap and break distance ties by insertion order.

use crate::dataset::LabeledDataset;
use crate::error::{KnnError, Result};
use crate::record::{self, check_json, JsonKind};
use crate::vector::squared_distance_unchecked;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split { axis: usize, split: f64, left: usize, right: usize },
    Leaf { point: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKdTree", into = "RawKdTree")]
pub struct KdTree {
    nodes: Vec<Node>,
    root: usize,
    data: LabeledDataset,
}

#[derive(Serialize, Deserialize)]
struct RawKdTree {
    nodes: Vec<Node>,
    root: usize,
    data: LabeledDataset,
}

impl From<KdTree> for RawKdTree {
    fn from(tree: KdTree) -> Self {
        RawKdTree { nodes: tree.nodes, root: tree.root, data: tree.data }
    }
}

impl TryFrom<RawKdTree> for KdTree {
    type Error = KnnError;

    fn try_from(raw: RawKdTree) -> Result<Self> {
        let tree = KdTree { nodes: raw.nodes, root: raw.root, data: raw.data };
        tree.validate()?;
        Ok(tree)
    }
}

/// One query result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour<'a> {
    pub id: &'a str,
    pub distance: f64,
}

/// Heap entry ordered by squared distance, then by insertion index.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist2: f64,
    point: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist2
            .total_cmp(&other.dist2)
            .then(self.point.cmp(&other.point))
    }
}

impl KdTree {
    /// Builds a tree over a copy of `dataset`.
    ///
    /// Later changes to `dataset` are not observed by the tree.
    pub fn build(dataset: &LabeledDataset) -> KdTree {
        let data = dataset.clone();
        let mut tree = KdTree { nodes: Vec::with_capacity(2 * data.size()), root: 0, data };

        if tree.data.is_empty() {
            return tree;
        }

        let mut order: Vec<usize> = (0..tree.data.size()).collect();
        tree.root = tree.build_recursive(&mut order);
        debug!(points = tree.size(), dims = tree.dims(), nodes = tree.nodes.len(), "built kd-tree");
        tree
    }

    fn build_recursive(&mut self, points: &mut [usize]) -> usize {
        if let [point] = points {
            self.nodes.push(Node::Leaf { point: *point });
            return self.nodes.len() - 1;
        }

        let axis = self.widest_axis(points);
        let data = &self.data;
        points.sort_by(|&a, &b| {
            data.row(a)[axis]
                .total_cmp(&data.row(b)[axis])
                .then(a.cmp(&b))
        });

        let mid = points.len() / 2;
        let split = self.data.row(points[mid])[axis];

        // Reserve the slot so the parent precedes its children in the arena
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { point: usize::MAX });

        let (lower, upper) = points.split_at_mut(mid);
        let left = self.build_recursive(lower);
        let right = self.build_recursive(upper);

        self.nodes[slot] = Node::Split { axis, split, left, right };
        slot
    }

    /// Axis with the largest max - min range; ties go to the lowest axis.
    fn widest_axis(&self, points: &[usize]) -> usize {
        let mut best_axis = 0;
        let mut best_spread = f64::NEG_INFINITY;

        for axis in 0..self.dims() {
            let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| {
                let v = self.data.row(p)[axis];
                (lo.min(v), hi.max(v))
            });
            let spread = hi - lo;
            if spread > best_spread {
                best_spread = spread;
                best_axis = axis;
            }
        }

        best_axis
    }

    /// Number of indexed points.
    pub fn size(&self) -> usize {
        self.data.size()
    }

    pub fn dims(&self) -> usize {
        self.data.dimension()
    }

    pub fn initialized(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// The snapshot the tree was built from.
    pub fn data(&self) -> &LabeledDataset {
        &self.data
    }

    pub fn clear(&mut self) {
        *self = KdTree::default();
    }

    /// Returns the `k` points closest to `point`, nearest first.
    ///
    /// Equidistant points are ranked by insertion order in the source dataset.
    ///
    /// # Errors
    ///
    /// * `SmallK` - `k` is zero
    /// * `NotEnoughData` - `k` exceeds the number of indexed points
    /// * `WrongPointSize` - `point` does not match the tree dimension
    ///
    /// # Examples
    ///
    /// ```
    /// use knnreg::{KdTree, LabeledDataset};
    ///
    /// let mut ds = LabeledDataset::new();
    /// ds.add("a", &[0.0, 0.0]).unwrap();
    /// ds.add("b", &[10.0, 0.0]).unwrap();
    /// ds.add("c", &[0.0, 10.0]).unwrap();
    ///
    /// let tree = KdTree::build(&ds);
    /// let nearest = tree.k_nearest(&[9.0, 1.0], 2).unwrap();
    /// assert_eq!(nearest[0].id, "b");
    /// assert_eq!(nearest.len(), 2);
    /// ```
    pub fn k_nearest(&self, point: &[f64], k: usize) -> Result<Vec<Neighbour<'_>>> {
        if k == 0 {
            return Err(KnnError::SmallK);
        }
        if k > self.size() {
            return Err(KnnError::NotEnoughData { k, size: self.size() });
        }
        if point.len() != self.dims() {
            return Err(KnnError::WrongPointSize { expected: self.dims(), found: point.len() });
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.search(self.root, point, k, &mut heap);

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbour { id: self.data.ids()[c.point].as_str(), distance: c.dist2.sqrt() })
            .collect())
    }

    fn search(&self, node: usize, query: &[f64], k: usize, heap: &mut BinaryHeap<Candidate>) {
        match self.nodes[node] {
            Node::Leaf { point } => {
                let candidate = Candidate {
                    dist2: squared_distance_unchecked(query, self.data.row(point)),
                    point,
                };
                if heap.len() < k {
                    heap.push(candidate);
                } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                    heap.pop();
                    heap.push(candidate);
                }
            }
            Node::Split { axis, split, left, right } => {
                let diff = query[axis] - split;
                let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };

                self.search(near, query, k, heap);

                // Equality still descends: the far side may hold an
                // equidistant point that was inserted earlier.
                let visit_far = heap.len() < k
                    || heap.peek().is_none_or(|worst| diff * diff <= worst.dist2);
                if visit_far {
                    self.search(far, query, k, heap);
                }
            }
        }
    }

    /// Encodes the tree as
    /// `{"cols", "root", "nodes": [..], "data": <dataset record>}`.
    pub fn to_json(&self) -> Value {
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .map(|node| match *node {
                Node::Split { axis, split, left, right } => {
                    json!({"axis": axis, "split": split, "left": left, "right": right})
                }
                Node::Leaf { point } => json!({"point": point}),
            })
            .collect();

        json!({
            "cols": self.dims(),
            "root": self.root,
            "nodes": nodes,
            "data": self.data.to_json(),
        })
    }

    /// Decodes and fully validates a record produced by [`to_json`](KdTree::to_json).
    pub fn from_json(value: &Value) -> Result<KdTree> {
        check_json(
            value,
            &[
                ("cols", JsonKind::Number),
                ("root", JsonKind::Number),
                ("nodes", JsonKind::Array),
                ("data", JsonKind::Object),
            ],
        )?;

        let cols = record::as_index(value, "cols")?;
        let root = record::as_index(value, "root")?;
        let data = LabeledDataset::from_json(&value["data"])?;

        let nodes = value["nodes"]
            .as_array()
            .map(|items| items.iter().map(decode_node).collect::<Result<Vec<_>>>())
            .unwrap_or_else(|| Ok(Vec::new()))?;

        if data.dimension() != cols {
            return Err(KnnError::Schema(format!(
                "tree has {} cols but its data has {}",
                cols,
                data.dimension()
            )));
        }

        let tree = KdTree { nodes, root, data };
        tree.validate()?;
        Ok(tree)
    }

    /// Checks the structural invariants of a decoded tree: every node is
    /// reached exactly once from the root, every point sits in exactly one
    /// leaf, and every leaf lies on the correct side of all its ancestors.
    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(KnnError::Schema(msg));

        if self.data.is_empty() {
            if self.nodes.is_empty() {
                return Ok(());
            }
            return invalid("tree has nodes but no data".to_string());
        }
        if self.nodes.len() != 2 * self.size() - 1 {
            return invalid(format!("{} points need {} nodes, found {}", self.size(), 2 * self.size() - 1, self.nodes.len()));
        }
        if self.root >= self.nodes.len() {
            return invalid(format!("root {} out of range", self.root));
        }

        let dims = self.dims();
        let mut node_seen = vec![false; self.nodes.len()];
        let mut point_seen = vec![false; self.size()];
        let mut stack = vec![(self.root, vec![f64::NEG_INFINITY; dims], vec![f64::INFINITY; dims])];

        while let Some((node, lo, hi)) = stack.pop() {
            if node >= self.nodes.len() {
                return invalid(format!("child {} out of range", node));
            }
            if std::mem::replace(&mut node_seen[node], true) {
                return invalid(format!("node {} reached twice", node));
            }

            match self.nodes[node] {
                Node::Leaf { point } => {
                    if point >= self.size() {
                        return invalid(format!("leaf refers to missing point {}", point));
                    }
                    if std::mem::replace(&mut point_seen[point], true) {
                        return invalid(format!("point {} stored twice", point));
                    }
                    let row = self.data.row(point);
                    let inside = (0..dims).all(|d| lo[d] <= row[d] && row[d] <= hi[d]);
                    if !inside {
                        return invalid(format!("point {} lies outside its cell", point));
                    }
                }
                Node::Split { axis, split, left, right } => {
                    if axis >= dims {
                        return invalid(format!("split axis {} out of range", axis));
                    }
                    let mut left_hi = hi.clone();
                    left_hi[axis] = left_hi[axis].min(split);
                    let mut right_lo = lo.clone();
                    right_lo[axis] = right_lo[axis].max(split);
                    stack.push((left, lo, left_hi));
                    stack.push((right, right_lo, hi));
                }
            }
        }

        Ok(())
    }
}

fn decode_node(value: &Value) -> Result<Node> {
    if value.get("point").is_some() {
        check_json(value, &[("point", JsonKind::Number)])?;
        return Ok(Node::Leaf { point: record::as_index(value, "point")? });
    }

    check_json(
        value,
        &[
            ("axis", JsonKind::Number),
            ("split", JsonKind::Number),
            ("left", JsonKind::Number),
            ("right", JsonKind::Number),
        ],
    )?;

    let split = value["split"]
        .as_f64()
        .ok_or_else(|| KnnError::Schema("split should be a number".to_string()))?;

    Ok(Node::Split {
        axis: record::as_index(value, "axis")?,
        split,
        left: record::as_index(value, "left")?,
        right: record::as_index(value, "right")?,
    })
}

#[cfg(test)]
mod kdtree_test {
    use super::*;

    fn dataset(points: &[(&str, &[f64])]) -> LabeledDataset {
        let mut ds = LabeledDataset::new();
        for (id, v) in points {
            ds.add(id, v).unwrap();
        }
        ds
    }

    fn grid(n: usize) -> LabeledDataset {
        let mut ds = LabeledDataset::new();
        for x in 0..n {
            for y in 0..n {
                ds.add(&format!("p{}_{}", x, y), &[x as f64, y as f64]).unwrap();
            }
        }
        ds
    }

    fn brute_force<'a>(ds: &'a LabeledDataset, query: &[f64], k: usize) -> Vec<(&'a str, f64)> {
        let mut all: Vec<(usize, f64)> = (0..ds.size())
            .map(|i| (i, squared_distance_unchecked(query, ds.row(i))))
            .collect();
        all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        all.truncate(k);
        all.into_iter().map(|(i, d)| (ds.ids()[i].as_str(), d.sqrt())).collect()
    }

    #[test]
    fn test_build_has_one_leaf_per_point() {
        let ds = grid(5);
        let tree = KdTree::build(&ds);

        assert_eq!(tree.size(), 25);
        assert_eq!(tree.dims(), 2);
        assert_eq!(tree.nodes.len(), 49);
        let leaves = tree.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count();
        assert_eq!(leaves, 25);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_build_single_point() {
        let tree = KdTree::build(&dataset(&[("only", &[1.0, 2.0])]));
        assert_eq!(tree.nodes, vec![Node::Leaf { point: 0 }]);

        let nearest = tree.k_nearest(&[100.0, -3.0], 1).unwrap();
        assert_eq!(nearest[0].id, "only");
    }

    #[test]
    fn test_build_splits_on_widest_axis() {
        // Spread on axis 1 is much larger than on axis 0
        let ds = dataset(&[("a", &[0.0, 0.0]), ("b", &[1.0, 50.0]), ("c", &[0.5, 100.0])]);
        let tree = KdTree::build(&ds);

        match tree.nodes[tree.root] {
            Node::Split { axis, split, .. } => {
                assert_eq!(axis, 1);
                assert_eq!(split, 50.0);
            }
            ref other => panic!("Expected a split at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let ds = grid(6);
        assert_eq!(KdTree::build(&ds), KdTree::build(&ds));
    }

    #[test]
    fn test_snapshot_ignores_later_mutation() {
        let mut ds = dataset(&[("a", &[0.0]), ("b", &[5.0])]);
        let tree = KdTree::build(&ds);

        ds.update("a", &[100.0]).unwrap();
        ds.remove("b").unwrap();

        assert_eq!(tree.size(), 2);
        assert_eq!(tree.k_nearest(&[0.0], 1).unwrap()[0].id, "a");
    }

    #[test]
    fn test_k_nearest_sorted_and_exact_count() {
        let ds = grid(7);
        let tree = KdTree::build(&ds);

        let result = tree.k_nearest(&[3.2, 2.9], 6).unwrap();
        assert_eq!(result.len(), 6);
        assert_eq!(result[0].id, "p3_3");
        for w in result.windows(2) {
            assert!(w[0].distance <= w[1].distance, "Results not sorted by distance");
        }
    }

    #[test]
    fn test_k_nearest_matches_brute_force() {
        let ds = grid(8);
        let tree = KdTree::build(&ds);

        for query in [[0.0, 0.0], [3.5, 3.5], [7.9, -2.0], [4.0, 4.0], [2.5, 6.0]] {
            for k in [1, 4, 9, 64] {
                let got: Vec<(&str, f64)> = tree
                    .k_nearest(&query, k)
                    .unwrap()
                    .into_iter()
                    .map(|n| (n.id, n.distance))
                    .collect();
                assert_eq!(got, brute_force(&ds, &query, k), "query {:?} k {}", query, k);
            }
        }
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        // All four points are at distance 1 from the origin
        let ds = dataset(&[
            ("east", &[1.0, 0.0]),
            ("north", &[0.0, 1.0]),
            ("west", &[-1.0, 0.0]),
            ("south", &[0.0, -1.0]),
        ]);
        let tree = KdTree::build(&ds);

        let ids: Vec<&str> = tree.k_nearest(&[0.0, 0.0], 4).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["east", "north", "west", "south"]);

        let first_two: Vec<&str> = tree.k_nearest(&[0.0, 0.0], 2).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(first_two, vec!["east", "north"]);
    }

    #[test]
    fn test_duplicate_coordinates() {
        let ds = dataset(&[("a", &[1.0]), ("b", &[1.0]), ("c", &[1.0]), ("d", &[2.0])]);
        let tree = KdTree::build(&ds);

        let ids: Vec<&str> = tree.k_nearest(&[1.0], 3).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_query_on_stored_point_comes_first() {
        let ds = grid(4);
        let tree = KdTree::build(&ds);

        let result = tree.k_nearest(&[2.0, 1.0], 3).unwrap();
        assert_eq!(result[0].id, "p2_1");
        assert_eq!(result[0].distance, 0.0);
    }

    #[test]
    fn test_k_nearest_errors() {
        let tree = KdTree::build(&grid(2));

        assert!(matches!(tree.k_nearest(&[0.0, 0.0], 0), Err(KnnError::SmallK)));
        assert!(matches!(tree.k_nearest(&[0.0, 0.0], 5), Err(KnnError::NotEnoughData { k: 5, size: 4 })));
        assert!(matches!(tree.k_nearest(&[0.0], 1), Err(KnnError::WrongPointSize { .. })));

        let empty = KdTree::default();
        assert!(matches!(empty.k_nearest(&[], 1), Err(KnnError::NotEnoughData { .. })));
    }

    #[test]
    fn test_clear() {
        let mut tree = KdTree::build(&grid(3));
        assert!(tree.initialized());

        tree.clear();
        assert!(!tree.initialized());
        assert_eq!(tree.size(), 0);
        assert_eq!(tree.dims(), 0);
    }

    #[test]
    fn test_json_round_trip() {
        let tree = KdTree::build(&grid(5));
        let decoded = KdTree::from_json(&tree.to_json()).unwrap();

        assert_eq!(decoded, tree);
        assert_eq!(
            decoded.k_nearest(&[1.2, 3.3], 5).unwrap(),
            tree.k_nearest(&[1.2, 3.3], 5).unwrap()
        );
    }

    #[test]
    fn test_from_json_rejects_tampered_split() {
        let tree = KdTree::build(&grid(4));
        let mut record = tree.to_json();

        let root = tree.root;
        record["nodes"][root]["split"] = serde_json::json!(-1000.0);
        assert!(matches!(KdTree::from_json(&record), Err(KnnError::Schema(_))));
    }

    #[test]
    fn test_from_json_rejects_shared_leaf() {
        let tree = KdTree::build(&dataset(&[("a", &[0.0]), ("b", &[1.0])]));
        let mut record = tree.to_json();

        // Point both children of the root at the same leaf
        let left = record["nodes"][0]["left"].clone();
        record["nodes"][0]["right"] = left;
        assert!(KdTree::from_json(&record).is_err());
    }

    #[test]
    fn test_from_json_rejects_missing_keys_and_bad_axis() {
        let tree = KdTree::build(&grid(2));

        let mut record = tree.to_json();
        record.as_object_mut().unwrap().remove("nodes");
        assert!(KdTree::from_json(&record).is_err());

        let mut record = tree.to_json();
        record["nodes"][0]["axis"] = serde_json::json!(7);
        assert!(KdTree::from_json(&record).is_err());

        let mut record = tree.to_json();
        record["cols"] = serde_json::json!(3);
        assert!(KdTree::from_json(&record).is_err());
    }

    #[test]
    fn test_bincode_round_trip_validates() {
        let tree = KdTree::build(&grid(3));
        let bytes = bincode::serialize(&tree).unwrap();
        let decoded: KdTree = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, tree);

        let mut broken = tree.clone();
        broken.nodes.pop();
        let bytes = bincode::serialize(&broken).unwrap();
        assert!(bincode::deserialize::<KdTree>(&bytes).is_err());
    }

    #[test]
    fn test_empty_tree_json() {
        let tree = KdTree::default();
        let decoded = KdTree::from_json(&tree.to_json()).unwrap();
        assert_eq!(decoded.size(), 0);
        assert!(!decoded.initialized());
    }
}
