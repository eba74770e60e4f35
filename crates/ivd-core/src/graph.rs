//! Animation curves.
//!
//! A [`Graph`] maps animation progress in `[0, 1]` to a destination weight.
//! Samples pin the weight at given progress values; between samples the
//! weight is interpolated linearly or with a cosine ease. The implicit end
//! points are `(0, 0)` and `(1, 1)`.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    #[default]
    Linear,
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Graph {
    mode: Interpolation,
    samples: Vec<Sample>,
}

impl Graph {
    pub fn new(mode: Interpolation) -> Self {
        Self { mode, samples: Vec::new() }
    }

    pub fn mode(&self) -> Interpolation {
        self.mode
    }

    /// Pins the destination weight `y` at progress `x`.
    pub fn add_sample(&mut self, x: f64, y: f64) {
        self.samples.push(Sample { x, y });
        self.samples.sort_by(|a, b| a.x.total_cmp(&b.x));
    }

    pub fn with_samples(mut self, samples: impl IntoIterator<Item = Sample>) -> Self {
        for s in samples {
            self.add_sample(s.x, s.y);
        }
        self
    }

    fn sample_points(&self, x: f64) -> (Sample, Sample) {
        let mut left = Sample { x: 0.0, y: 0.0 };
        let mut right = Sample { x: 1.0, y: 1.0 };
        for sample in &self.samples {
            if sample.x == x {
                return (*sample, *sample);
            }
            if sample.x < x {
                left = *sample;
            } else {
                right = *sample;
                break;
            }
        }
        (left, right)
    }

    /// Destination weight for progress `x`.
    pub fn weight(&self, x: f64) -> f64 {
        let (left, right) = self.sample_points(x);
        if left.y == right.y {
            return left.y;
        }
        let x = match self.mode {
            Interpolation::Linear => x,
            Interpolation::Smooth => (1.0 - (x * PI).cos()) / 2.0,
        };
        left.y * (1.0 - x) + right.y * x
    }

    pub fn interpolate(&self, origin: f64, dest: f64, progress: f64) -> f64 {
        let w = self.weight(progress);
        origin * (1.0 - w) + dest * w
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            Interpolation::Linear => "linear",
            Interpolation::Smooth => "smooth",
        };
        write!(f, "{mode}")?;
        for s in &self.samples {
            write!(f, " {}@{}", s.x, s.y)?;
        }
        Ok(())
    }
}

/// Duration plus curve of an eased attribute change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transition {
    pub milliseconds: u64,
    pub graph: Graph,
}

impl Transition {
    pub fn new(milliseconds: u64, graph: Graph) -> Self {
        Self { milliseconds, graph }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms {}", self.milliseconds, self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_defaults_are_identity() {
        let g = Graph::new(Interpolation::Linear);
        assert_eq!(g.weight(0.0), 0.0);
        assert_eq!(g.weight(0.25), 0.25);
        assert_eq!(g.interpolate(10.0, 20.0, 0.5), 15.0);
    }

    #[test]
    fn test_smooth_is_symmetric() {
        let g = Graph::new(Interpolation::Smooth);
        assert!((g.weight(0.5) - 0.5).abs() < 1e-9);
        assert!(g.weight(0.1) < 0.1);
        assert_eq!(g.weight(1.0), 1.0);
    }

    #[test]
    fn test_exact_sample_is_returned() {
        let mut g = Graph::new(Interpolation::Linear);
        g.add_sample(0.5, 0.9);
        assert_eq!(g.weight(0.5), 0.9);
    }

    #[test]
    fn test_flat_segment() {
        let mut g = Graph::new(Interpolation::Linear);
        g.add_sample(0.2, 1.0);
        assert_eq!(g.weight(0.6), 1.0);
    }
}
