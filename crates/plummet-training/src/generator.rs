//! Convergence-driven training sample generation.
//!
//! Instead of rolling every position out a fixed number of times, the
//! generator keeps rolling a position out until the standard error of its
//! running mean final score drops below a target. Cheap, low-variance
//! positions get few rollouts; contested positions get many.

use std::thread;

use plummet_engine::{Board, PieceKind};
use plummet_evaluator::{BoardEvaluator, EvaluationError, LookaheadEvaluator};
use plummet_stats::Welford;
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{
    dataset::SplitDataSet,
    rollout::{Rollout, RolloutError, RolloutPolicy, rollout},
    sample::ScoreSample,
};

/// How many fresh (position, piece) draws to try before giving up on a base
/// game whose recorded positions are all dead ends.
const SEED_RETRY_LIMIT: usize = 100;

/// Distribution of seed positions over a base game's position history.
///
/// Several historical weightings exist for this choice and none of them is
/// canonical; treat the shape as a tunable.
#[derive(Debug, Clone, Copy)]
pub enum SeedBias {
    /// Every recorded position is equally likely.
    Uniform,
    /// Take the maximum of `n` uniform draws: biases toward late positions.
    MaxOfN(u32),
    /// Take the minimum of `n` uniform draws: biases toward early positions.
    MinOfN(u32),
}

impl SeedBias {
    fn sample_unit<R>(self, rng: &mut R) -> f64
    where
        R: Rng + ?Sized,
    {
        match self {
            SeedBias::Uniform => rng.random(),
            SeedBias::MaxOfN(n) => (0..n)
                .map(|_| rng.random::<f64>())
                .fold(0.0, f64::max),
            SeedBias::MinOfN(n) => (0..n)
                .map(|_| rng.random::<f64>())
                .fold(1.0, f64::min),
        }
    }

    #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    #[expect(clippy::cast_sign_loss)]
    fn sample_index<R>(self, len: usize, rng: &mut R) -> usize
    where
        R: Rng + ?Sized,
    {
        ((self.sample_unit(rng) * len as f64) as usize).min(len - 1)
    }
}

/// Tunables for [`SampleGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Line horizon for base games and playouts.
    pub lines_horizon: u32,
    /// Samples drawn from one base game before playing a fresh one.
    pub samples_per_game: usize,
    /// Seed-position distribution over a base game's history.
    pub seed_bias: SeedBias,
    /// Playouts per convergence check; also the floor before the first check.
    pub min_playouts: usize,
    /// Hard cap on playouts per sample.
    pub max_playouts: usize,
    /// Stop rolling out once the standard error of the mean drops below this.
    pub standard_error_target: f64,
    /// Policy for base games and playouts.
    pub rollout: RolloutPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            lines_horizon: 130,
            samples_per_game: 10,
            seed_bias: SeedBias::MaxOfN(3),
            min_playouts: 10,
            max_playouts: 200,
            standard_error_target: 5.0,
            rollout: RolloutPolicy::default(),
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum GeneratorError {
    #[display("rollout failed while generating samples")]
    Rollout(RolloutError),
    #[display("board evaluation failed while generating samples")]
    Evaluation(EvaluationError),
}

impl From<RolloutError> for GeneratorError {
    fn from(err: RolloutError) -> Self {
        GeneratorError::Rollout(err)
    }
}

impl From<EvaluationError> for GeneratorError {
    fn from(err: EvaluationError) -> Self {
        GeneratorError::Evaluation(err)
    }
}

/// Turns rollouts into labeled [`ScoreSample`]s.
pub struct SampleGenerator<'a, E>
where
    E: BoardEvaluator + ?Sized,
{
    evaluator: &'a E,
    config: GeneratorConfig,
}

impl<'a, E> SampleGenerator<'a, E>
where
    E: BoardEvaluator + ?Sized,
{
    #[must_use]
    pub fn new(evaluator: &'a E, config: GeneratorConfig) -> Self {
        Self { evaluator, config }
    }

    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates `count` deep samples.
    ///
    /// Each sample is a mid-game position stepped one random move forward,
    /// labeled with the converged mean final score of repeated playouts from
    /// there. Seed positions with no legal continuation for the drawn piece
    /// are discarded and redrawn rather than emitted as degenerate samples.
    #[expect(clippy::cast_possible_truncation)]
    pub fn generate<R>(&self, count: usize, rng: &mut R) -> Result<Vec<ScoreSample>, GeneratorError>
    where
        R: Rng,
    {
        let mut samples = Vec::with_capacity(count);
        let mut progress = Welford::new();

        while samples.len() < count {
            let base = self.base_game(rng)?;
            let mut produced = 0;
            while produced < self.config.samples_per_game && samples.len() < count {
                let Some((prev, seed)) = self.draw_seed(&base.positions, rng) else {
                    // Every retry hit a dead end; play a fresh base game.
                    break;
                };
                let (stats, scores) = self.converge(&seed, rng)?;
                progress.update(stats.mean());
                samples.push(ScoreSample {
                    board: seed,
                    prev_board: Some(prev),
                    final_score: stats.mean() as f32,
                    score_stdev: stats.sample_stdev().map(|s| s as f32),
                    final_score_samples: Some(scores),
                });
                produced += 1;
                if samples.len().is_multiple_of(10) {
                    eprintln!("{}/{count} samples: {}", samples.len(), progress.summary());
                }
            }
        }
        Ok(samples)
    }

    /// Generates `count` lookahead samples.
    ///
    /// A lookahead sample labels a position with the mean over all 7 piece
    /// kinds of the best evaluator score among that piece's choices — the
    /// model is constantly asked to score exactly such choice sets, so this
    /// is training data of the same shape, without any playouts.
    pub fn generate_lookahead<R>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<ScoreSample>, GeneratorError>
    where
        R: Rng,
    {
        let lookahead = LookaheadEvaluator::new(self.evaluator);
        let mut samples = Vec::with_capacity(count);

        while samples.len() < count {
            let base = self.base_game(rng)?;
            for _ in 0..self.config.samples_per_game {
                if samples.len() >= count {
                    break;
                }
                let index = rng.random_range(0..base.positions.len());
                let position = &base.positions[index];
                let kind: PieceKind = rng.random();
                if position.find_choices(kind).is_empty() {
                    continue;
                }
                let scores = lookahead.evaluate(std::slice::from_ref(position))?;
                samples.push(ScoreSample {
                    board: position.clone(),
                    prev_board: None,
                    final_score: scores[0],
                    final_score_samples: None,
                    score_stdev: None,
                });
            }
        }
        Ok(samples)
    }

    /// Generates `count` deep samples and appends them to `store`.
    pub fn generate_into<R>(
        &self,
        store: &mut SplitDataSet<ScoreSample>,
        count: usize,
        rng: &mut R,
    ) -> Result<(), GeneratorError>
    where
        R: Rng,
    {
        let samples = self.generate(count, rng)?;
        store.add(samples);
        Ok(())
    }

    fn base_game<R>(&self, rng: &mut R) -> Result<Rollout, GeneratorError>
    where
        R: Rng,
    {
        let start = Board::new(self.config.lines_horizon);
        Ok(rollout(&start, self.evaluator, &self.config.rollout, rng)?)
    }

    /// Draws a (previous board, seed board) pair from a position history.
    ///
    /// The seed is one uniformly random legal continuation of a
    /// bias-selected position. Returns `None` when [`SEED_RETRY_LIMIT`]
    /// consecutive draws all had empty choice sets.
    fn draw_seed<R>(&self, positions: &[Board], rng: &mut R) -> Option<(Board, Board)>
    where
        R: Rng,
    {
        for _ in 0..SEED_RETRY_LIMIT {
            let index = self.config.seed_bias.sample_index(positions.len(), rng);
            let position = &positions[index];
            let kind: PieceKind = rng.random();
            let mut choices = position.find_choices(kind);
            if choices.is_empty() {
                continue;
            }
            let pick = rng.random_range(0..choices.len());
            return Some((position.clone(), choices.swap_remove(pick)));
        }
        None
    }

    /// Runs playouts from `seed` until the standard error of the running
    /// mean final score drops below the target, or the playout cap is hit.
    ///
    /// Playouts within a batch run as independent scoped threads; they share
    /// the evaluator (which must tolerate concurrent calls — the batching
    /// layer exists exactly for this) and nothing else.
    #[expect(clippy::cast_possible_truncation)]
    fn converge<R>(&self, seed: &Board, rng: &mut R) -> Result<(Welford, Vec<f32>), GeneratorError>
    where
        R: Rng,
    {
        let mut acc = Welford::new();
        let mut raw_scores = Vec::new();

        while (acc.n() as usize) < self.config.max_playouts {
            let batch = self
                .config
                .min_playouts
                .min(self.config.max_playouts - acc.n() as usize)
                .max(1);

            let results: Vec<Result<f32, RolloutError>> = thread::scope(|s| {
                let handles: Vec<_> = (0..batch)
                    .map(|_| {
                        let mut playout_rng = Pcg32::from_rng(rng);
                        s.spawn(move || {
                            rollout(seed, self.evaluator, &self.config.rollout, &mut playout_rng)
                                .map(|r| r.final_score)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().expect("playout thread panicked"))
                    .collect()
            });

            for result in results {
                let score = result?;
                acc.update(f64::from(score));
                raw_scores.push(score);
            }

            if let Some(se) = acc.standard_error()
                && acc.n() as usize >= self.config.min_playouts
                && se < self.config.standard_error_target
            {
                break;
            }
        }
        Ok((acc, raw_scores))
    }
}
