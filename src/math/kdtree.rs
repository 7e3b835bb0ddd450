//! Static 3D kd-tree for nearest-neighbour queries over scattered samples.
//!
//! The tree is built once (median split on the widest axis) and never
//! modified. Queries return indices into the original point slice, sorted by
//! distance with ties broken by the lower index so results are deterministic.

use std::cmp::Ordering;

const LEAF_SIZE: usize = 8;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        axis: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<[f64; 3]>,
    order: Vec<usize>,
    root: Node,
}

impl KdTree {
    pub fn build(points: Vec<[f64; 3]>) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let root = build_node(&points, &mut order, 0);
        Self { points, order, root }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, idx: usize) -> [f64; 3] {
        self.points[idx]
    }

    /// Index of the closest point, or `None` for an empty tree.
    pub fn nearest(&self, query: [f64; 3]) -> Option<usize> {
        self.k_nearest(query, 1).first().map(|(idx, _)| *idx)
    }

    /// Up to `k` closest points as `(index, squared distance)`, closest first.
    pub fn k_nearest(&self, query: [f64; 3], k: usize) -> Vec<(usize, f64)> {
        if k == 0 || self.points.is_empty() {
            return Vec::new();
        }
        let mut best: Vec<(usize, f64)> = Vec::with_capacity(k + 1);
        self.search(&self.root, query, k, &mut best);
        best
    }

    fn search(&self, node: &Node, query: [f64; 3], k: usize, best: &mut Vec<(usize, f64)>) {
        match node {
            Node::Leaf { start, end } => {
                for &idx in &self.order[*start..*end] {
                    let d2 = dist2(self.points[idx], query);
                    insert_candidate(best, k, idx, d2);
                }
            }
            Node::Split {
                axis,
                value,
                left,
                right,
            } => {
                let diff = query[*axis] - value;
                let (near, far) = if diff <= 0.0 { (left, right) } else { (right, left) };
                self.search(near, query, k, best);
                let worst = if best.len() < k {
                    f64::INFINITY
                } else {
                    best[best.len() - 1].1
                };
                if diff * diff <= worst {
                    self.search(far, query, k, best);
                }
            }
        }
    }
}

fn build_node(points: &[[f64; 3]], order: &mut [usize], offset: usize) -> Node {
    if order.len() <= LEAF_SIZE {
        return Node::Leaf {
            start: offset,
            end: offset + order.len(),
        };
    }

    let axis = widest_axis(points, order);
    order.sort_by(|&a, &b| {
        points[a][axis]
            .partial_cmp(&points[b][axis])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mid = order.len() / 2;
    let value = points[order[mid - 1]][axis];

    let (lo, hi) = order.split_at_mut(mid);
    Node::Split {
        axis,
        value,
        left: Box::new(build_node(points, lo, offset)),
        right: Box::new(build_node(points, hi, offset + mid)),
    }
}

fn widest_axis(points: &[[f64; 3]], order: &[usize]) -> usize {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for &idx in order {
        for ax in 0..3 {
            lo[ax] = lo[ax].min(points[idx][ax]);
            hi[ax] = hi[ax].max(points[idx][ax]);
        }
    }
    (0..3)
        .max_by(|&a, &b| (hi[a] - lo[a]).partial_cmp(&(hi[b] - lo[b])).unwrap_or(Ordering::Equal))
        .unwrap_or(0)
}

fn insert_candidate(best: &mut Vec<(usize, f64)>, k: usize, idx: usize, d2: f64) {
    let pos = best
        .iter()
        .position(|&(i, d)| d2 < d || (d2 == d && idx < i))
        .unwrap_or(best.len());
    if pos >= k {
        return;
    }
    best.insert(pos, (idx, d2));
    best.truncate(k);
}

pub fn dist2(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(points: &[[f64; 3]], q: [f64; 3], k: usize) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..points.len()).collect();
        idx.sort_by(|&a, &b| {
            dist2(points[a], q)
                .partial_cmp(&dist2(points[b], q))
                .unwrap()
                .then(a.cmp(&b))
        });
        idx.truncate(k);
        idx
    }

    #[test]
    fn matches_brute_force_on_lattice() {
        let mut points = Vec::new();
        for i in 0..6 {
            for j in 0..5 {
                for k in 0..4 {
                    points.push([i as f64, j as f64 * 1.5, k as f64 * 0.7]);
                }
            }
        }
        let tree = KdTree::build(points.clone());
        for q in [[0.2, 0.1, 0.0], [2.5, 3.0, 1.0], [10.0, -3.0, 4.0], [3.0, 1.5, 1.4]] {
            let got: Vec<usize> = tree.k_nearest(q, 7).into_iter().map(|(i, _)| i).collect();
            assert_eq!(got, brute_force(&points, q, 7), "query {q:?}");
        }
    }

    #[test]
    fn empty_tree_has_no_neighbours() {
        let tree = KdTree::build(Vec::new());
        assert!(tree.nearest([0.0, 0.0, 0.0]).is_none());
    }
}
