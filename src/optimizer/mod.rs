//! Hough parameter search against user-marked cell centres.

pub mod candidates;
pub mod scoring;

use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::DynamicImage;

use crate::detection::circles::EdgeField;
use crate::detection::strategies::HoughStrategy;
use crate::models::{Cell, Circle};
use crate::overlap;
use crate::params::{DetectionAlgorithm, DetectionParams, HoughParams};
use candidates::{candidate_strategies, min_separation};
pub use scoring::MatchingPolicy;
use scoring::coverage_score;

/// Scores at or above this cover every point without spare detections.
pub const PERFECT_SCORE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerConfig {
    /// Wall-clock budget, checked between trials.
    pub time_budget: Duration,
    pub matching: MatchingPolicy,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(60),
            matching: MatchingPolicy::Optimal,
        }
    }
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    /// A trial reached [`PERFECT_SCORE`].
    Perfect,
    /// The time budget ran out first; the best partial result is returned.
    TimedOut,
    /// Every candidate was tried without a perfect score.
    Exhausted,
    /// Nothing to fit; the input parameters are returned unchanged.
    NoPoints,
}

#[derive(Debug, Clone)]
pub struct AutoFitResult {
    pub params: DetectionParams,
    pub score: f64,
    pub outcome: FitOutcome,
    pub trials: usize,
    pub elapsed: Duration,
}

impl AutoFitResult {
    pub fn is_perfect(&self) -> bool {
        self.outcome == FitOutcome::Perfect
    }
}

/// Searches Hough parameters under which detection followed by distance
/// overlap resolution covers every marked point.
#[derive(Debug, Clone, Default)]
pub struct AutoFitOptimizer {
    config: OptimizerConfig,
}

impl AutoFitOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run the bounded search. Never fails; trial errors score zero.
    pub fn fit(&self, image: &DynamicImage, points: &[(f64, f64)], current: &DetectionParams) -> AutoFitResult {
        let start = Instant::now();
        if points.is_empty() {
            log::info!("Auto-fit skipped: no marked points");
            return AutoFitResult {
                params: current.clone(),
                score: 0.0,
                outcome: FitOutcome::NoPoints,
                trials: 0,
                elapsed: start.elapsed(),
            };
        }

        let separation = min_separation(points);
        log::info!(
            "Auto-fit over {} points, min separation {:.1}px, budget {:?}",
            points.len(),
            separation,
            self.config.time_budget
        );

        let mut fields: HashMap<u64, EdgeField> = HashMap::new();
        let mut best: Option<(HoughParams, f64)> = None;
        let mut trials = 0;
        let mut outcome = FitOutcome::Exhausted;

        'search: for strategy in candidate_strategies(separation) {
            log::debug!("Candidate strategy '{}': {} trials", strategy.name, strategy.trials.len());
            for hough in strategy.trials {
                if start.elapsed() >= self.config.time_budget {
                    outcome = FitOutcome::TimedOut;
                    break 'search;
                }

                let field = fields
                    .entry(hough.param1.to_bits())
                    .or_insert_with(|| HoughStrategy::edge_field(image, hough.param1));
                let score = match self.score_trial(field, &hough, current.overlap_threshold, points) {
                    Ok(score) => score,
                    Err(e) => {
                        log::debug!("Trial {:?} failed: {:#}", hough, e);
                        0.0
                    }
                };
                trials += 1;
                log::trace!("{} {:?} -> {:.3}", strategy.name, hough, score);

                if best.as_ref().is_none_or(|(_, s)| score > *s) {
                    best = Some((hough, score));
                }
                if score >= PERFECT_SCORE {
                    outcome = FitOutcome::Perfect;
                    break 'search;
                }
            }
        }

        let elapsed = start.elapsed();
        let Some((hough, score)) = best else {
            log::warn!("Auto-fit ran no trials within the budget");
            return AutoFitResult {
                params: current.clone(),
                score: 0.0,
                outcome,
                trials,
                elapsed,
            };
        };

        match outcome {
            FitOutcome::Perfect => log::info!("Auto-fit found a perfect fit after {} trials", trials),
            FitOutcome::TimedOut => {
                log::warn!("Auto-fit timed out after {} trials, best score {:.3}", trials, score)
            }
            _ => log::info!("Auto-fit exhausted {} trials, best score {:.3}", trials, score),
        }

        AutoFitResult {
            params: fitted_params(current, hough),
            score,
            outcome,
            trials,
            elapsed,
        }
    }

    /// Detect circles with `hough`, resolve overlaps and score the result.
    pub fn score_trial(
        &self,
        field: &EdgeField,
        hough: &HoughParams,
        overlap_threshold: f64,
        points: &[(f64, f64)],
    ) -> Result<f64> {
        let circles = HoughStrategy::circles(field, hough)?;
        let cells: Vec<Cell> = circles
            .iter()
            .map(|c| Cell::new(c.x, c.y, c.radius, c.area()))
            .collect();
        let kept: Vec<Circle> = overlap::resolve_by_distance(cells, overlap_threshold)
            .iter()
            .map(|c| Circle::new(c.center_x, c.center_y, c.radius))
            .collect();
        Ok(coverage_score(points, &kept, self.config.matching))
    }
}

/// Hough parameters for the detector, with area bounds wide enough to keep
/// every circle of the radius band.
fn fitted_params(current: &DetectionParams, hough: HoughParams) -> DetectionParams {
    let min_area = PI * (hough.min_radius as f64).powi(2);
    let max_area = PI * (hough.max_radius as f64).powi(2);
    let mut params = current.clone().with_algorithm(DetectionAlgorithm::HoughCircles);
    params.min_cell_area = params.min_cell_area.min(min_area);
    params.max_cell_area = params.max_cell_area.max(max_area);
    params.hough = hough;
    params
}
