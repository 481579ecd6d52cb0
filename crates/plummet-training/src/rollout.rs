//! Self-play rollout engine.
//!
//! A rollout drives one board from a starting state to termination: draw a
//! uniform-random piece, enumerate the legal resting placements, score them
//! through the evaluator, pick one with a temperature-scaled softmax policy,
//! repeat. Steps are strictly sequential — step n+1's legal choices depend on
//! the board chosen at step n — so a rollout suspends only while its own
//! evaluation call is in flight. Whether that call is a direct scorer or a
//! ticket against a batching layer is invisible here.

use plummet_engine::{Board, PieceKind};
use plummet_evaluator::{BoardEvaluator, EvaluationError};
use plummet_stats::softmax;
use rand::{Rng, distr::weighted::WeightedIndex, prelude::Distribution as _};

/// Move-selection and termination parameters for a rollout.
#[derive(Debug, Clone)]
pub struct RolloutPolicy {
    /// Softmax temperature: 0 plays the arg-max move, larger values sample
    /// moves with probability proportional to `exp(score / temperature)`.
    pub temperature: f64,
    /// Stop (successfully) once the stack grows above this height.
    pub height_limit: u32,
    /// Abort with [`RolloutError::RunawayGame`] after this many steps.
    pub step_limit: usize,
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            height_limit: 15,
            step_limit: 2500,
        }
    }
}

/// One completed rollout: the visited boards and the shaped final score.
#[derive(Debug, Clone)]
pub struct Rollout {
    /// Every board visited, starting board first. Never empty.
    pub positions: Vec<Board>,
    /// Terminal score plus one point per successfully placed piece, a small
    /// shaping bonus that rewards survival before the model knows how to
    /// score lines.
    pub final_score: f32,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum RolloutError {
    /// The game failed to terminate within the step limit. This is a logic
    /// defect in placement enumeration or in the caller's configuration, not
    /// a recoverable condition.
    #[display("rollout exceeded {step_limit} steps without terminating")]
    RunawayGame { step_limit: usize },
    /// The evaluator failed; the rollout cannot continue without scores.
    #[display("board evaluation failed during rollout")]
    Evaluation(EvaluationError),
}

impl From<EvaluationError> for RolloutError {
    fn from(err: EvaluationError) -> Self {
        RolloutError::Evaluation(err)
    }
}

/// Plays one game from `start` to termination.
///
/// The rollout records each visited board, then stops at the first of: the
/// board is `finished`, the stack exceeds the policy height limit, or the
/// drawn piece has no legal placement. The step limit is a hard safety bound;
/// exceeding it fails loudly instead of looping forever.
#[expect(clippy::cast_precision_loss)]
pub fn rollout<E, R>(
    start: &Board,
    evaluator: &E,
    policy: &RolloutPolicy,
    rng: &mut R,
) -> Result<Rollout, RolloutError>
where
    E: BoardEvaluator + ?Sized,
    R: Rng + ?Sized,
{
    let mut board = start.clone();
    let mut positions = Vec::new();

    loop {
        positions.push(board.clone());
        if board.finished() || board.max_height() > policy.height_limit {
            break;
        }
        if positions.len() >= policy.step_limit {
            return Err(RolloutError::RunawayGame {
                step_limit: policy.step_limit,
            });
        }

        let kind: PieceKind = rng.random();
        let mut choices = board.find_choices(kind);
        if choices.is_empty() {
            break;
        }

        let scores = evaluator.evaluate(&choices)?;
        let index = select_choice(&scores, policy.temperature, rng);
        board = choices.swap_remove(index);
    }

    // Every recorded position except the terminal one had a piece placed.
    let placed_pieces = positions.len() - 1;
    let final_score = board.score() as f32 + placed_pieces as f32;
    Ok(Rollout {
        positions,
        final_score,
    })
}

/// Picks a choice index from a score vector under the softmax policy.
fn select_choice<R>(scores: &[f32], temperature: f64, rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    if temperature == 0.0 {
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        return best;
    }

    let scores: Vec<f64> = scores.iter().copied().map(f64::from).collect();
    let probs = softmax(&scores, temperature);
    WeightedIndex::new(&probs)
        .expect("softmax probabilities are positive and sum to one")
        .sample(rng)
}

#[cfg(test)]
mod tests {
    use plummet_engine::{BOARD_HEIGHT, BOARD_WIDTH, Grid};
    use plummet_evaluator::{ConstantEvaluator, FnEvaluator, HeightPenaltyEvaluator};
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn rng(seed: u64) -> Pcg32 {
        Pcg32::seed_from_u64(seed)
    }

    #[test]
    fn test_constant_evaluator_rollout_terminates() {
        let start = Board::new(130);
        let result = rollout(
            &start,
            &ConstantEvaluator::new(0.0),
            &RolloutPolicy::default(),
            &mut rng(1),
        )
        .unwrap();

        assert!(!result.positions.is_empty());
        assert_eq!(result.positions[0], start);
        let last = result.positions.last().unwrap();
        assert_eq!(
            result.final_score,
            last.score() as f32 + (result.positions.len() - 1) as f32
        );
    }

    #[test]
    fn test_rollout_is_deterministic_under_seed() {
        let start = Board::new(30);
        let policy = RolloutPolicy::default();
        let evaluator = HeightPenaltyEvaluator::default();

        let a = rollout(&start, &evaluator, &policy, &mut rng(7)).unwrap();
        let b = rollout(&start, &evaluator, &policy, &mut rng(7)).unwrap();

        assert_eq!(a.positions.len(), b.positions.len());
        assert_eq!(a.positions.last(), b.positions.last());
        assert_eq!(a.final_score, b.final_score);
    }

    #[test]
    fn test_height_limit_stops_rollout() {
        let tall = Board::with_grid(
            Grid::from_ascii(
                r"
                #.........
                #.........
                ",
            ),
            130,
        );
        let policy = RolloutPolicy {
            height_limit: 1,
            ..RolloutPolicy::default()
        };
        let result = rollout(&tall, &ConstantEvaluator::new(0.0), &policy, &mut rng(2)).unwrap();
        assert_eq!(result.positions.len(), 1);
    }

    #[test]
    fn test_empty_choice_list_ends_the_game() {
        // One gap per row, nothing clears, nothing fits: every piece draw
        // has zero legal placements.
        let mut art = String::new();
        for y in 0..BOARD_HEIGHT {
            for x in 0..BOARD_WIDTH {
                art.push(if x == y % BOARD_WIDTH { '.' } else { '#' });
            }
            art.push('\n');
        }
        let jammed = Board::with_grid(Grid::from_ascii(&art), 130);
        let policy = RolloutPolicy {
            height_limit: 20,
            ..RolloutPolicy::default()
        };
        let result = rollout(&jammed, &ConstantEvaluator::new(0.0), &policy, &mut rng(3)).unwrap();
        assert_eq!(result.positions.len(), 1);
    }

    #[test]
    fn test_step_limit_fails_loudly() {
        let err = rollout(
            &Board::new(1000),
            &ConstantEvaluator::new(0.0),
            &RolloutPolicy {
                step_limit: 3,
                ..RolloutPolicy::default()
            },
            &mut rng(4),
        )
        .unwrap_err();
        assert!(matches!(err, RolloutError::RunawayGame { step_limit: 3 }));
    }

    #[test]
    fn test_evaluator_failure_propagates() {
        let failing = FnEvaluator(|_: &[Board]| -> Result<Vec<f32>, EvaluationError> {
            Err(EvaluationError::new("no model loaded"))
        });
        let err = rollout(
            &Board::new(130),
            &failing,
            &RolloutPolicy::default(),
            &mut rng(5),
        )
        .unwrap_err();
        assert!(matches!(err, RolloutError::Evaluation(_)));
    }

    #[test]
    fn test_positive_temperature_still_terminates() {
        let policy = RolloutPolicy {
            temperature: 1.0,
            ..RolloutPolicy::default()
        };
        let result = rollout(
            &Board::new(50),
            &HeightPenaltyEvaluator::default(),
            &policy,
            &mut rng(6),
        )
        .unwrap();
        assert!(!result.positions.is_empty());
    }

    #[test]
    fn test_select_choice_argmax_takes_first_max() {
        let mut r = rng(8);
        assert_eq!(select_choice(&[1.0, 5.0, 2.0], 0.0, &mut r), 1);
        assert_eq!(select_choice(&[4.0, 4.0, 1.0], 0.0, &mut r), 0);
    }
}
