//! Statistical utilities for the self-play data pipeline.
//!
//! - [`welford`]: O(1)-space streaming mean/variance, used to decide when a
//!   position has been rolled out often enough
//! - [`descriptive`]: batch mean and standard deviation helpers
//! - [`softmax`]: temperature-scaled softmax for stochastic move selection

pub use self::{
    descriptive::{mean, population_stdev, sample_stdev},
    softmax::softmax,
    welford::Welford,
};

pub mod descriptive;
pub mod softmax;
pub mod welford;
