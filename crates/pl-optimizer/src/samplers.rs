//! Built-in sampling strategies.
//!
//! Samplers work in the unit cube of the parameter space; the study decodes
//! points back into concrete, step-quantized values. These are lightweight
//! stand-ins for the real model-based optimizers, good enough to drive the
//! loop end to end.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::cmp::Ordering;

/// A told trial as seen by a sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Unit-cube coordinates.
    pub point: Vec<f64>,
    /// Reward oriented so that larger is better.
    pub utility: f64,
}

/// Common trait for all sampling strategies.
pub trait Sampler: Send {
    /// Propose the next unit-cube point of `dims` dimensions given the told
    /// history.
    fn sample(&mut self, dims: usize, history: &[Observation], rng: &mut ChaCha8Rng) -> Vec<f64>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

fn uniform(dims: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    (0..dims).map(|_| rng.gen::<f64>()).collect()
}

fn gaussian(rng: &mut ChaCha8Rng, sigma: f64) -> f64 {
    Normal::new(0.0, sigma)
        .map(|n| n.sample(rng))
        .unwrap_or(0.0)
}

/// History sorted best-first.
fn ranked(history: &[Observation]) -> Vec<&Observation> {
    let mut sorted: Vec<&Observation> = history.iter().collect();
    sorted.sort_by(|a, b| b.utility.partial_cmp(&a.utility).unwrap_or(Ordering::Equal));
    sorted
}

// ---- Random ----

/// Independent uniform sampling.
#[derive(Debug, Clone, Default)]
pub struct RandomSampler;

impl Sampler for RandomSampler {
    fn sample(&mut self, dims: usize, _history: &[Observation], rng: &mut ChaCha8Rng) -> Vec<f64> {
        uniform(dims, rng)
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Parzen estimator ----

/// Tree-structured Parzen style sampler.
///
/// After a random start-up phase, observations are split into a "good" top
/// quantile and the rest. Candidates are drawn around good points and the one
/// maximizing the good/bad kernel density ratio is returned.
#[derive(Debug, Clone)]
pub struct ParzenSampler {
    pub n_startup_trials: usize,
    /// Fraction of observations treated as good.
    pub gamma: f64,
    pub n_candidates: usize,
    /// Probability of a pure random draw after start-up.
    pub exploration_weight: f64,
}

impl ParzenSampler {
    pub fn new(exploration_weight: f64) -> Self {
        Self {
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
        }
    }

    fn bandwidth(n: usize, dims: usize) -> f64 {
        (0.3 * (n as f64).powf(-1.0 / (dims as f64 + 4.0))).clamp(0.02, 0.5)
    }

    fn density(x: &[f64], points: &[&Observation], h: f64) -> f64 {
        if points.is_empty() {
            return 1.0;
        }
        let total: f64 = points
            .iter()
            .map(|p| {
                let sq: f64 = x.iter().zip(&p.point).map(|(a, b)| (a - b).powi(2)).sum();
                (-sq / (2.0 * h * h)).exp()
            })
            .sum();
        total / points.len() as f64
    }
}

impl Default for ParzenSampler {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl Sampler for ParzenSampler {
    fn sample(&mut self, dims: usize, history: &[Observation], rng: &mut ChaCha8Rng) -> Vec<f64> {
        if history.len() < self.n_startup_trials || rng.gen::<f64>() < self.exploration_weight {
            return uniform(dims, rng);
        }

        let sorted = ranked(history);
        let n_good = ((self.gamma * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
        let (good, bad) = sorted.split_at(n_good);
        let h = Self::bandwidth(history.len(), dims);

        let mut best: Option<(f64, Vec<f64>)> = None;
        for _ in 0..self.n_candidates.max(1) {
            let base = &good[rng.gen_range(0..good.len())].point;
            let candidate: Vec<f64> = base
                .iter()
                .map(|b| (b + gaussian(rng, h)).clamp(0.0, 1.0))
                .collect();
            let ratio = (Self::density(&candidate, good, h) + 1e-12).ln()
                - (Self::density(&candidate, bad, h) + 1e-12).ln();
            if best.as_ref().map_or(true, |(r, _)| ratio > *r) {
                best = Some((ratio, candidate));
            }
        }

        best.map(|(_, c)| c).unwrap_or_else(|| uniform(dims, rng))
    }

    fn name(&self) -> &str {
        "tpe"
    }
}

// ---- Evolution strategy ----

/// Evolution-strategy sampler in the spirit of CMA-ES, without covariance
/// adaptation: Gaussian perturbation around the elite mean, with a step size
/// that shrinks as evidence accumulates.
#[derive(Debug, Clone)]
pub struct EvolutionSampler {
    pub initial_sigma: f64,
    pub min_sigma: f64,
}

impl Default for EvolutionSampler {
    fn default() -> Self {
        Self {
            initial_sigma: 0.3,
            min_sigma: 0.02,
        }
    }
}

impl EvolutionSampler {
    fn sigma(&self, n: usize, dims: usize) -> f64 {
        let decay = (1.0 + n as f64 / (2.0 * dims.max(1) as f64)).sqrt();
        (self.initial_sigma / decay).max(self.min_sigma)
    }
}

impl Sampler for EvolutionSampler {
    fn sample(&mut self, dims: usize, history: &[Observation], rng: &mut ChaCha8Rng) -> Vec<f64> {
        if history.len() < 2 {
            return uniform(dims, rng);
        }

        let sorted = ranked(history);
        let n_elite = (sorted.len() / 4).max(1);
        let elite = &sorted[..n_elite];
        let sigma = self.sigma(history.len(), dims);

        (0..dims)
            .map(|d| {
                let mean = elite.iter().map(|o| o.point[d]).sum::<f64>() / n_elite as f64;
                let spread = (elite.iter().map(|o| (o.point[d] - mean).powi(2)).sum::<f64>()
                    / n_elite as f64)
                    .sqrt();
                let s = (0.5 * sigma + 0.5 * spread).max(self.min_sigma);
                (mean + gaussian(rng, s)).clamp(0.0, 1.0)
            })
            .collect()
    }

    fn name(&self) -> &str {
        "cmaes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// 1-D history peaking at x = 0.8.
    fn peaked_history(n: usize) -> Vec<Observation> {
        (0..n)
            .map(|i| {
                let x = i as f64 / (n - 1) as f64;
                Observation {
                    point: vec![x],
                    utility: -(x - 0.8).powi(2),
                }
            })
            .collect()
    }

    fn mean_of(sampler: &mut dyn Sampler, history: &[Observation], draws: usize) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        (0..draws)
            .map(|_| sampler.sample(1, history, &mut rng)[0])
            .sum::<f64>()
            / draws as f64
    }

    #[test]
    fn random_sampler_stays_in_unit_cube() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut sampler = RandomSampler;
        for _ in 0..100 {
            let point = sampler.sample(3, &[], &mut rng);
            assert_eq!(point.len(), 3);
            assert!(point.iter().all(|u| (0.0..=1.0).contains(u)));
        }
    }

    #[test]
    fn same_seed_same_draws() {
        let history = peaked_history(20);
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        let mut sampler = ParzenSampler::new(0.0);
        for _ in 0..10 {
            assert_eq!(sampler.sample(1, &history, &mut a), sampler.sample(1, &history, &mut b));
        }
    }

    #[test]
    fn parzen_starts_with_exploration() {
        let mut sampler = ParzenSampler::new(0.0);
        let history = peaked_history(5); // below the start-up threshold
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let point = sampler.sample(2, &history[..3], &mut rng);
        assert_eq!(point.len(), 2);
    }

    #[test]
    fn parzen_exploits_after_startup() {
        let history = peaked_history(20);
        let mean = mean_of(&mut ParzenSampler::new(0.0), &history, 200);
        assert!(mean > 0.6, "expected draws near 0.8, mean was {mean}");
    }

    #[test]
    fn evolution_moves_toward_elite() {
        let history = peaked_history(20);
        let mean = mean_of(&mut EvolutionSampler::default(), &history, 200);
        assert!(mean > 0.6, "expected draws near 0.8, mean was {mean}");
    }

    #[test]
    fn evolution_sigma_shrinks() {
        let sampler = EvolutionSampler::default();
        assert!(sampler.sigma(50, 2) < sampler.sigma(2, 2));
        assert!(sampler.sigma(1_000_000, 1) >= sampler.min_sigma);
    }

    #[test]
    fn strategy_names() {
        assert_eq!(RandomSampler.name(), "random");
        assert_eq!(ParzenSampler::default().name(), "tpe");
        assert_eq!(EvolutionSampler::default().name(), "cmaes");
    }
}
