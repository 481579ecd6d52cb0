/// Temperature-scaled softmax over a score vector.
///
/// Converts scores into a selection probability vector:
///
/// - `temperature == 0` degenerates to a one-hot argmax (ties go to the
///   first maximal index)
/// - `temperature > 0` weights each entry by `exp(score / temperature)`;
///   larger temperatures flatten the distribution toward uniform
///
/// The maximum is subtracted before exponentiating, so the result is stable
/// for scores of any magnitude. Returns an empty vector for empty input.
///
/// # Examples
///
/// ```
/// use plummet_stats::softmax;
///
/// assert_eq!(softmax(&[3.0, 1.0, 2.0], 0.0), [1.0, 0.0, 0.0]);
/// ```
#[must_use]
pub fn softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    let Some(max) = scores.iter().copied().reduce(f64::max) else {
        return Vec::new();
    };

    if temperature == 0.0 {
        let argmax = scores
            .iter()
            .position(|&s| s == max)
            .expect("non-empty scores have a maximal index");
        return scores
            .iter()
            .enumerate()
            .map(|(i, _)| if i == argmax { 1.0 } else { 0.0 })
            .collect();
    }

    let exps: Vec<f64> = scores
        .iter()
        .map(|&s| ((s - max) / temperature).exp())
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_zero_temperature_is_argmax() {
        assert_eq!(softmax(&[3.0, 1.0, 2.0], 0.0), [1.0, 0.0, 0.0]);
        assert_eq!(softmax(&[1.0, 5.0, 2.0], 0.0), [0.0, 1.0, 0.0]);
        // Ties resolve to the first maximal index.
        assert_eq!(softmax(&[4.0, 4.0], 0.0), [1.0, 0.0]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        for temperature in [0.1, 1.0, 7.5, 100.0] {
            let probs = softmax(&[3.0, 1.0, 2.0], temperature);
            assert_close(probs.iter().sum(), 1.0);
            assert!(probs.iter().all(|&p| p > 0.0));
        }
    }

    #[test]
    fn test_high_temperature_approaches_uniform() {
        let probs = softmax(&[3.0, 1.0, 2.0], 1e6);
        for p in probs {
            assert!((p - 1.0 / 3.0).abs() < 1e-5, "{p}");
        }
    }

    #[test]
    fn test_low_temperature_concentrates_on_max() {
        let probs = softmax(&[3.0, 1.0, 2.0], 0.01);
        assert!(probs[0] > 0.999);
    }

    #[test]
    fn test_stable_for_large_scores() {
        let probs = softmax(&[1e9, 1e9 - 1.0], 1.0);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert_close(probs.iter().sum(), 1.0);
        assert!(probs[0] > probs[1]);
    }

    #[test]
    fn test_empty_input() {
        assert!(softmax(&[], 0.0).is_empty());
        assert!(softmax(&[], 1.0).is_empty());
    }
}
