//! Spatial index over the nodes of one routing level.

use std::collections::HashMap;

use super::node::NodeIdx;
use crate::design::{Point, Rect};

/// Uniform-grid bucket index for nearest-node and window queries.
#[derive(Debug, Clone)]
pub struct NodeLocator {
    cell: i64,
    buckets: HashMap<(i64, i64), Vec<(Point, NodeIdx)>>,
    /// Occupied cell range, for bounding the nearest search
    cell_lo: (i64, i64),
    cell_hi: (i64, i64),
}

impl NodeLocator {
    pub fn new(points: impl IntoIterator<Item = (Point, NodeIdx)>, cell: i64) -> Self {
        let cell = cell.max(1);
        let mut buckets: HashMap<(i64, i64), Vec<(Point, NodeIdx)>> = HashMap::new();
        let mut cell_lo = (i64::MAX, i64::MAX);
        let mut cell_hi = (i64::MIN, i64::MIN);

        for (p, idx) in points {
            let key = cell_of(p, cell);
            cell_lo = (cell_lo.0.min(key.0), cell_lo.1.min(key.1));
            cell_hi = (cell_hi.0.max(key.0), cell_hi.1.max(key.1));
            buckets.entry(key).or_default().push((p, idx));
        }

        Self {
            cell,
            buckets,
            cell_lo,
            cell_hi,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Nearest node to `p`; ties go to the lowest index.
    pub fn nearest(&self, p: Point) -> Option<NodeIdx> {
        if self.is_empty() {
            return None;
        }

        let (cx, cy) = cell_of(p, self.cell);
        let max_ring = [
            (cx - self.cell_lo.0).abs(),
            (self.cell_hi.0 - cx).abs(),
            (cy - self.cell_lo.1).abs(),
            (self.cell_hi.1 - cy).abs(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        let mut best: Option<(i128, NodeIdx)> = None;
        for ring in 0..=max_ring {
            for key in ring_cells(cx, cy, ring) {
                let Some(bucket) = self.buckets.get(&key) else {
                    continue;
                };
                for &(q, idx) in bucket {
                    let d = p.distance_sq(&q);
                    let better = match best {
                        None => true,
                        Some((bd, bidx)) => d < bd || (d == bd && idx < bidx),
                    };
                    if better {
                        best = Some((d, idx));
                    }
                }
            }
            // Anything in the next ring is at least `ring * cell` away.
            if let Some((bd, _)) = best {
                let bound = (ring as i128) * (self.cell as i128);
                if bd < bound * bound {
                    break;
                }
            }
        }

        best.map(|(_, idx)| idx)
    }

    /// Nodes inside `rect` (inclusive), sorted by index.
    pub fn within(&self, rect: &Rect) -> Vec<NodeIdx> {
        let lo = cell_of(Point::new(rect.x_min, rect.y_min), self.cell);
        let hi = cell_of(Point::new(rect.x_max, rect.y_max), self.cell);
        let mut found = Vec::new();

        // Sparse scan when the window covers more cells than are occupied.
        let window_cells = (hi.0 - lo.0 + 1).saturating_mul(hi.1 - lo.1 + 1);
        if window_cells as usize > self.buckets.len() {
            for (key, bucket) in &self.buckets {
                if key.0 < lo.0 || key.0 > hi.0 || key.1 < lo.1 || key.1 > hi.1 {
                    continue;
                }
                found.extend(bucket.iter().filter(|(q, _)| rect.contains(*q)).map(|(_, i)| *i));
            }
        } else {
            for gx in lo.0..=hi.0 {
                for gy in lo.1..=hi.1 {
                    if let Some(bucket) = self.buckets.get(&(gx, gy)) {
                        found.extend(bucket.iter().filter(|(q, _)| rect.contains(*q)).map(|(_, i)| *i));
                    }
                }
            }
        }

        found.sort_unstable();
        found
    }
}

fn cell_of(p: Point, cell: i64) -> (i64, i64) {
    (p.x.div_euclid(cell), p.y.div_euclid(cell))
}

fn ring_cells(cx: i64, cy: i64, ring: i64) -> Vec<(i64, i64)> {
    if ring == 0 {
        return vec![(cx, cy)];
    }
    let mut cells = Vec::with_capacity((8 * ring) as usize);
    for dx in -ring..=ring {
        cells.push((cx + dx, cy - ring));
        cells.push((cx + dx, cy + ring));
    }
    for dy in (-ring + 1)..ring {
        cells.push((cx - ring, cy + dy));
        cells.push((cx + ring, cy + dy));
    }
    cells
}
