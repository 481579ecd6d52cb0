//! Board scoring interfaces for the self-play data pipeline.
//!
//! The pipeline never knows what a scoring function looks like inside; it
//! depends only on the [`BoardEvaluator`] capability trait. This crate
//! provides that trait, a set of simple reference evaluators for
//! bootstrapping and tests, and [`BatchingEvaluator`], which coalesces many
//! concurrent evaluation calls into few large calls against an expensive
//! underlying scorer.

use std::sync::Arc;

use plummet_engine::Board;

pub use self::{
    batch::{BatchPolicy, BatchingEvaluator, EvalTicket},
    evaluators::{
        ConstantEvaluator, FnEvaluator, HeightPenaltyEvaluator, LookaheadEvaluator,
        NoisyEvaluator, RandomEvaluator,
    },
};

pub mod batch;
pub mod evaluators;

/// Batch board scoring capability.
///
/// Implementations must return one score per input board, in input order,
/// must not observably mutate the boards, and must be safe to call
/// concurrently with themselves; the batching layer relies on all three.
pub trait BoardEvaluator: Send + Sync {
    /// Scores each board in `boards`. `scores[i]` corresponds to `boards[i]`.
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError>;
}

impl<E> BoardEvaluator for &E
where
    E: BoardEvaluator + ?Sized,
{
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError> {
        (**self).evaluate(boards)
    }
}

/// Failure of an underlying scoring call.
///
/// Cloning is cheap (the message is shared), so a single scorer failure can
/// reject every caller waiting on the same coalesced batch.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("board evaluation failed: {message}")]
pub struct EvaluationError {
    message: Arc<str>,
}

impl EvaluationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into().into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
