//! Self-play data generation for training a board-scoring function.
//!
//! This crate drives the simulation engine to grow a labeled dataset:
//!
//! 1. **Rollouts** ([`rollout()`]) — play games to completion with a
//!    stochastic, evaluator-guided policy
//! 2. **Convergence sampling** ([`generator`]) — roll mid-game positions out
//!    repeatedly, stopping once the score estimate's standard error is below
//!    a target, and emit labeled [`sample::ScoreSample`]s
//! 3. **Storage** ([`dataset`]) — a capacity-bounded store with a
//!    deterministic train/validation partition and newline-delimited JSON
//!    persistence, sharded across independent generator runs
//!
//! The scoring function itself is external; everything here depends only on
//! the `plummet_evaluator::BoardEvaluator` capability.

pub use self::{
    dataset::{ADMISSION_BATCH, DatasetError, SplitDataSet, SplitSample},
    generator::{GeneratorConfig, GeneratorError, SampleGenerator, SeedBias},
    rollout::{Rollout, RolloutError, RolloutPolicy, rollout},
    sample::ScoreSample,
};

pub mod dataset;
pub mod generator;
pub mod rollout;
pub mod sample;
