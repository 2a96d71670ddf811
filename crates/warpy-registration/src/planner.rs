//! Block subdivision planning.
//!
//! Starting from the full region, each iteration halves the currently larger
//! block side and lays a landmark grid with that pitch, centred on the region
//! centre. Grids that are too small, do not span both axes, or do not grow
//! over the previous accepted scale are skipped; accepted scales are numbered
//! contiguously.

use crate::block::Block;
use crate::config::MultiscaleConfig;
use serde::{Deserialize, Serialize};
use warpy_core::transform::MIN_LANDMARKS;
use warpy_core::{Point2, Rect, Vector2};

const GRID_EPS: f64 = 1e-9;

/// Blocks and landmarks of one accepted scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalePlan {
    pub scale: usize,
    pub block_half_width: f64,
    pub block_half_height: f64,
    pub columns: usize,
    pub rows: usize,
    /// Landmark centres in the fixed frame, row-major.
    pub landmarks: Vec<Point2>,
}

impl ScalePlan {
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// The registration field of view around `landmark`.
    pub fn block_at(&self, landmark: Point2) -> Block {
        Block::new(landmark, self.block_half_width, self.block_half_height)
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.landmarks.iter().map(|&p| self.block_at(p))
    }
}

/// Plans the coarse-to-fine landmark grids.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPlanner {
    pub min_landmarks: usize,
    pub max_landmarks: usize,
    pub max_iterations: usize,
}

impl Default for BlockPlanner {
    fn default() -> Self {
        Self {
            min_landmarks: MIN_LANDMARKS,
            max_landmarks: 4096,
            max_iterations: 64,
        }
    }
}

impl BlockPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Planner limits taken from a multi-scale config.
    pub fn from_config(config: &MultiscaleConfig) -> Self {
        Self {
            min_landmarks: config.min_landmarks_per_scale.max(MIN_LANDMARKS),
            max_landmarks: config.max_landmarks_per_scale,
            max_iterations: config.max_plan_iterations,
        }
    }

    pub fn with_min_landmarks(mut self, min_landmarks: usize) -> Self {
        self.min_landmarks = min_landmarks.max(MIN_LANDMARKS);
        self
    }

    /// Plan up to `n_scales` scales over `region`.
    ///
    /// Returns fewer scales when the iteration cap or the landmark limit is
    /// reached first, and an empty plan for a degenerate region.
    pub fn plan(&self, region: &Rect, n_scales: usize) -> Vec<ScalePlan> {
        let mut plans: Vec<ScalePlan> = Vec::new();
        if region.is_degenerate() || n_scales == 0 {
            return plans;
        }

        let (width, height) = (region.width(), region.height());
        let center = region.center();
        let (mut block_w, mut block_h) = (width, height);
        let mut last_count = 0usize;

        for _ in 0..self.max_iterations {
            if plans.len() == n_scales {
                break;
            }
            if block_w >= block_h {
                block_w *= 0.5;
            } else {
                block_h *= 0.5;
            }

            let half_cols = (0.5 * width / block_w + GRID_EPS).floor() as usize;
            let half_rows = (0.5 * height / block_h + GRID_EPS).floor() as usize;
            let (columns, rows) = (2 * half_cols + 1, 2 * half_rows + 1);
            let count = columns * rows;

            if count > self.max_landmarks {
                tracing::debug!(
                    "Planner stops: {}x{} grid exceeds {} landmarks",
                    columns,
                    rows,
                    self.max_landmarks
                );
                break;
            }
            if columns < 2 || rows < 2 || count < self.min_landmarks || count <= last_count {
                continue;
            }

            let mut landmarks = Vec::with_capacity(count);
            for j in -(half_rows as i64)..=(half_rows as i64) {
                for i in -(half_cols as i64)..=(half_cols as i64) {
                    landmarks.push(center + Vector2::new(i as f64 * block_w, j as f64 * block_h));
                }
            }

            last_count = count;
            plans.push(ScalePlan {
                scale: plans.len(),
                block_half_width: 0.5 * block_w,
                block_half_height: 0.5 * block_h,
                columns,
                rows,
                landmarks,
            });
        }

        plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_region_plan() {
        let plans = BlockPlanner::new().plan(&Rect::from_bounds(0.0, 0.0, 100.0, 100.0), 3);
        assert_eq!(plans.len(), 3);

        // 50x100 blocks give a 3x1 grid, rejected; 50x50 is the first scale
        assert_eq!((plans[0].columns, plans[0].rows), (3, 3));
        assert_eq!(plans[0].block_half_width, 25.0);
        assert_eq!(plans[0].block_half_height, 25.0);
        assert_eq!((plans[1].columns, plans[1].rows), (5, 3));
        assert_eq!((plans[2].columns, plans[2].rows), (5, 5));
        assert_eq!(plans.iter().map(|p| p.scale).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_landmark_at_region_center() {
        let region = Rect::from_bounds(10.0, -20.0, 70.0, 20.0);
        for plan in BlockPlanner::new().plan(&region, 4) {
            assert!(plan.landmarks.contains(&region.center()));
            assert!(plan.landmarks.iter().all(|p| region.contains(p)));
        }
    }

    #[test]
    fn test_elongated_region_spans_both_axes() {
        let plans = BlockPlanner::new().plan(&Rect::from_bounds(0.0, 0.0, 100.0, 10.0), 2);
        assert_eq!(plans.len(), 2);
        for plan in &plans {
            assert!(plan.columns >= 3 && plan.rows >= 3);
        }
    }

    #[test]
    fn test_degenerate_region_gives_empty_plan() {
        let p = Point2::new(5.0, 5.0);
        assert!(BlockPlanner::new().plan(&Rect::new(p, p), 3).is_empty());
        assert!(BlockPlanner::new()
            .plan(&Rect::from_bounds(0.0, 0.0, 100.0, 0.0), 3)
            .is_empty());
    }

    #[test]
    fn test_landmark_limit_truncates_plan() {
        let planner = BlockPlanner {
            max_landmarks: 20,
            ..BlockPlanner::default()
        };
        let plans = planner.plan(&Rect::from_bounds(0.0, 0.0, 100.0, 100.0), 5);
        assert_eq!(plans.len(), 2);
    }

    #[test]
    fn test_blocks_tile_region() {
        let plans = BlockPlanner::new().plan(&Rect::from_bounds(0.0, 0.0, 64.0, 32.0), 2);
        let plan = &plans[0];
        let blocks: Vec<Block> = plan.blocks().collect();
        assert_eq!(blocks.len(), plan.len());
        let first = blocks[0];
        let second = blocks[1];
        assert!((second.center.x - first.center.x - 2.0 * first.half_width).abs() < 1e-12);
    }
}
