use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::allocation::ScoreBreakdown;
use crate::models::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub distance: f64,
    pub rating: f64,
    pub success_rate: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            distance: 0.5,
            rating: 0.3,
            success_rate: 0.2,
        }
    }
}

impl RankingWeights {
    pub fn validate(&self) -> Result<(), AppError> {
        let weights = [self.distance, self.rating, self.success_rate];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AppError::Validation(
                "ranking weights must be finite and >= 0".to_string(),
            ));
        }
        if weights.iter().all(|w| *w == 0.0) {
            return Err(AppError::Validation(
                "at least one ranking weight must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub worker_id: Uuid,
    pub distance_km: f64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

pub fn compute_score(
    worker: &Worker,
    distance_km: f64,
    radius_km: f64,
    weights: &RankingWeights,
) -> (f64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        distance_km,
        distance_score: distance_score(distance_km, radius_km),
        rating_score: rating_score(worker),
        success_score: success_score(worker),
    };

    (weighted_score(&breakdown, weights), breakdown)
}

pub fn weighted_score(breakdown: &ScoreBreakdown, weights: &RankingWeights) -> f64 {
    (breakdown.distance_score * weights.distance)
        + (breakdown.rating_score * weights.rating)
        + (breakdown.success_score * weights.success_rate)
}

fn distance_score(distance_km: f64, radius_km: f64) -> f64 {
    if radius_km <= 0.0 {
        return 0.0;
    }
    (1.0 - distance_km.max(0.0) / radius_km).clamp(0.0, 1.0)
}

fn rating_score(worker: &Worker) -> f64 {
    (worker.rating.to_f64().unwrap_or(0.0) / 5.0).clamp(0.0, 1.0)
}

fn success_score(worker: &Worker) -> f64 {
    (worker.success_rate().to_f64().unwrap_or(0.0) / 100.0).clamp(0.0, 1.0)
}

/// Orders candidates best first: score desc, then distance asc, then worker id.
pub fn rank(
    candidates: &[(Worker, f64)],
    radius_km: f64,
    weights: &RankingWeights,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|(worker, distance_km)| {
            let (score, breakdown) = compute_score(worker, *distance_km, radius_km, weights);
            ScoredCandidate {
                worker_id: worker.id,
                distance_km: *distance_km,
                score,
                breakdown,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.distance_km.total_cmp(&b.distance_km))
            .then_with(|| a.worker_id.cmp(&b.worker_id))
    });
    scored
}

/// A ranked candidate list consumed one worker at a time across cascade
/// rounds. Callers re-rank once `is_stale` reports the snapshot is too old.
#[derive(Debug)]
pub struct CandidateRanking {
    queue: VecDeque<ScoredCandidate>,
    ranked_at: Instant,
    stale_after: Duration,
}

impl CandidateRanking {
    pub fn new(ranked: Vec<ScoredCandidate>, stale_after: Duration) -> Self {
        Self {
            queue: ranked.into(),
            ranked_at: Instant::now(),
            stale_after,
        }
    }

    pub fn next_candidate(&mut self, excluded: &HashSet<Uuid>) -> Option<ScoredCandidate> {
        while let Some(candidate) = self.queue.pop_front() {
            if !excluded.contains(&candidate.worker_id) {
                return Some(candidate);
            }
        }
        None
    }

    pub fn is_stale(&self) -> bool {
        self.ranked_at.elapsed() > self.stale_after
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}
