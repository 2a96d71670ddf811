//! Landmark correspondences collected during a scale.

use serde::{Deserialize, Serialize};
use warpy_core::Point2;

/// A fixed-frame landmark and the moving-frame point it was matched to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPair {
    pub fixed: Point2,
    pub moving: Point2,
}

impl LandmarkPair {
    pub fn new(fixed: Point2, moving: Point2) -> Self {
        Self { fixed, moving }
    }

    /// Moving minus fixed position.
    pub fn displacement(&self) -> warpy_core::Vector2 {
        self.moving - self.fixed
    }
}

/// Append-only set of `(source, target)` point pairs.
///
/// Sources are fixed-frame landmarks and targets their moving-frame matches.
/// Pairs stay index-aligned: `sources()[i]` corresponds to `targets()[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    sources: Vec<Point2>,
    targets: Vec<Point2>,
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sources: Vec::with_capacity(capacity),
            targets: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, pair: LandmarkPair) {
        self.sources.push(pair.fixed);
        self.targets.push(pair.moving);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[Point2] {
        &self.sources
    }

    pub fn targets(&self) -> &[Point2] {
        &self.targets
    }

    pub fn get(&self, index: usize) -> Option<LandmarkPair> {
        Some(LandmarkPair::new(*self.sources.get(index)?, *self.targets.get(index)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = LandmarkPair> + '_ {
        self.sources
            .iter()
            .zip(&self.targets)
            .map(|(s, t)| LandmarkPair::new(*s, *t))
    }

    /// Flattened coordinates as `([xs, ys], [xs, ys])` for sources and targets.
    pub fn as_arrays(&self) -> ([Vec<f64>; 2], [Vec<f64>; 2]) {
        let split = |points: &[Point2]| -> [Vec<f64>; 2] {
            [
                points.iter().map(|p| p.x).collect(),
                points.iter().map(|p| p.y).collect(),
            ]
        };
        (split(&self.sources), split(&self.targets))
    }

    /// Largest displacement magnitude among the pairs.
    pub fn max_displacement(&self) -> f64 {
        self.iter()
            .map(|p| p.displacement().norm())
            .fold(0.0, f64::max)
    }
}

impl Extend<LandmarkPair> for PointSet {
    fn extend<I: IntoIterator<Item = LandmarkPair>>(&mut self, iter: I) {
        for pair in iter {
            self.push(pair);
        }
    }
}

impl FromIterator<LandmarkPair> for PointSet {
    fn from_iter<I: IntoIterator<Item = LandmarkPair>>(iter: I) -> Self {
        let mut set = PointSet::new();
        set.extend(iter);
        set
    }
}
