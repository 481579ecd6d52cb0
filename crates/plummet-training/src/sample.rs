use plummet_engine::Board;
use serde::{Deserialize, Serialize};

/// One labeled training record produced by the data generator.
///
/// Immutable once created; the only consumer is serialization into the
/// dataset store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSample {
    /// The position being labeled.
    pub board: Board,
    /// The position the labeled board was reached from, when the sample came
    /// from a played move rather than a synthetic lookahead label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_board: Option<Board>,
    /// The label: mean final score across the rollouts run from `board`.
    pub final_score: f32,
    /// Raw per-rollout final scores behind `final_score`, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score_samples: Option<Vec<f32>>,
    /// Sample standard deviation of `final_score_samples`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_stdev: Option<f32>,
}

impl ScoreSample {
    /// Encodes this sample as a JSON record for the dataset store.
    #[must_use]
    pub fn to_record(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("score samples always serialize to JSON")
    }

    /// Decodes a sample from a JSON record.
    pub fn from_record(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}
