//! Reference evaluators.
//!
//! None of these knows anything about a learned model; they exist to
//! bootstrap data generation before a model is trained, to add exploration
//! noise on top of another evaluator, and to give tests something cheap and
//! deterministic to score with.

use plummet_engine::{Board, PieceKind};
use rand::Rng as _;
use rand_distr::{Distribution as _, Normal};

use crate::{BoardEvaluator, EvaluationError};

/// Adapts a plain function or closure into a [`BoardEvaluator`].
pub struct FnEvaluator<F>(pub F);

impl<F> BoardEvaluator for FnEvaluator<F>
where
    F: Fn(&[Board]) -> Result<Vec<f32>, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError> {
        (self.0)(boards)
    }
}

/// Scores every board with the same constant.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantEvaluator {
    score: f32,
}

impl ConstantEvaluator {
    #[must_use]
    pub fn new(score: f32) -> Self {
        Self { score }
    }
}

impl BoardEvaluator for ConstantEvaluator {
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError> {
        Ok(vec![self.score; boards.len()])
    }
}

/// Scores boards with uniform noise in `[0, 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomEvaluator;

impl BoardEvaluator for RandomEvaluator {
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError> {
        let mut rng = rand::rng();
        Ok(boards.iter().map(|_| rng.random()).collect())
    }
}

/// Simple stack-shape heuristic: penalizes tall stacks and covered holes.
///
/// Strong enough to keep bootstrap games alive noticeably longer than random
/// play, which is all it is for.
#[derive(Debug, Clone, Copy)]
pub struct HeightPenaltyEvaluator {
    hole_weight: f32,
}

impl Default for HeightPenaltyEvaluator {
    fn default() -> Self {
        Self { hole_weight: 4.0 }
    }
}

impl HeightPenaltyEvaluator {
    #[must_use]
    pub fn new(hole_weight: f32) -> Self {
        Self { hole_weight }
    }
}

impl BoardEvaluator for HeightPenaltyEvaluator {
    #[expect(clippy::cast_precision_loss)]
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError> {
        Ok(boards
            .iter()
            .map(|board| {
                -(board.max_height() as f32) - self.hole_weight * board.count_holes() as f32
            })
            .collect())
    }
}

/// Wraps another evaluator and adds Gaussian noise to each score.
#[derive(Debug, Clone)]
pub struct NoisyEvaluator<E> {
    inner: E,
    noise: Normal<f32>,
}

impl<E> NoisyEvaluator<E> {
    /// # Panics
    ///
    /// Panics if `sigma` is not finite and non-negative.
    #[must_use]
    pub fn new(inner: E, sigma: f32) -> Self {
        Self {
            inner,
            noise: Normal::new(0.0, sigma).expect("sigma must be finite and non-negative"),
        }
    }
}

impl<E> BoardEvaluator for NoisyEvaluator<E>
where
    E: BoardEvaluator,
{
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError> {
        let mut rng = rand::rng();
        let scores = self.inner.evaluate(boards)?;
        Ok(scores
            .into_iter()
            .map(|s| s + self.noise.sample(&mut rng))
            .collect())
    }
}

/// One-ply lookahead over an inner evaluator.
///
/// A board's score is the mean, over all 7 piece kinds, of the best inner
/// score among that piece's choices. A piece with no legal choice contributes
/// the board's own accumulated score, so dead ends pull the average down to
/// what the game is actually worth from there.
#[derive(Debug, Clone)]
pub struct LookaheadEvaluator<E> {
    inner: E,
}

impl<E> LookaheadEvaluator<E> {
    #[must_use]
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<E> BoardEvaluator for LookaheadEvaluator<E>
where
    E: BoardEvaluator,
{
    #[expect(clippy::cast_precision_loss)]
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError> {
        let mut results = Vec::with_capacity(boards.len());
        for board in boards {
            let mut sum = 0.0;
            for kind in PieceKind::ALL {
                let choices = board.find_choices(kind);
                if choices.is_empty() {
                    sum += board.score() as f32;
                    continue;
                }
                let scores = self.inner.evaluate(&choices)?;
                sum += scores
                    .into_iter()
                    .reduce(f32::max)
                    .expect("non-empty choices yield at least one score");
            }
            results.push(sum / PieceKind::LEN as f32);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use plummet_engine::Grid;

    use super::*;

    #[test]
    fn test_constant_evaluator() {
        let boards = vec![Board::new(130); 3];
        let scores = ConstantEvaluator::new(7.0).evaluate(&boards).unwrap();
        assert_eq!(scores, [7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_fn_evaluator() {
        let evaluator = FnEvaluator(|boards: &[Board]| -> Result<Vec<f32>, EvaluationError> {
            Ok(boards.iter().map(|b| b.max_height() as f32).collect())
        });
        let scores = evaluator.evaluate(&[Board::new(130)]).unwrap();
        assert_eq!(scores, [0.0]);
    }

    #[test]
    fn test_height_penalty_prefers_flat_boards() {
        let flat = Board::new(130);
        let tall = Board::with_grid(
            Grid::from_ascii(
                r"
                #.........
                #.........
                #.........
                ",
            ),
            130,
        );
        let holey = Board::with_grid(
            Grid::from_ascii(
                r"
                ###.......
                #.#.......
                ",
            ),
            130,
        );
        let scores = HeightPenaltyEvaluator::default()
            .evaluate(&[flat, tall, holey])
            .unwrap();
        assert!(scores[0] > scores[1]);
        assert!(scores[1] > scores[2]);
    }

    #[test]
    fn test_noisy_evaluator_stays_close_to_inner() {
        let evaluator = NoisyEvaluator::new(ConstantEvaluator::new(10.0), 0.5);
        let scores = evaluator.evaluate(&vec![Board::new(130); 100]).unwrap();
        assert_eq!(scores.len(), 100);
        assert!(scores.iter().all(|s| (s - 10.0).abs() < 5.0));
        // Not all equal: the noise must actually be applied.
        assert!(scores.iter().any(|&s| s != scores[0]));
    }

    #[test]
    fn test_lookahead_scores_one_per_board() {
        let evaluator = LookaheadEvaluator::new(HeightPenaltyEvaluator::default());
        let boards = vec![Board::new(10), Board::new(10)];
        let scores = evaluator.evaluate(&boards).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], scores[1]);
    }

    #[test]
    fn test_lookahead_falls_back_to_board_score_when_stuck() {
        // A finished board has no choices for any piece, so the lookahead
        // reduces to the board's own score for every piece kind.
        let board = Board::new(0);
        let evaluator = LookaheadEvaluator::new(ConstantEvaluator::new(99.0));
        let scores = evaluator.evaluate(std::slice::from_ref(&board)).unwrap();
        assert_eq!(scores, [board.score() as f32]);
    }
}
