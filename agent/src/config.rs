use std::{path::PathBuf, time::Duration};

use similarity::DEFAULT_MATCH_THRESHOLD;

/// Learning-rate starting point before the visit-count schedule.
pub const ALPHA_START: f64 = 0.5;
/// Visit-count thresholds at which the learning rate steps down by 0.1.
pub const ALPHA_THRESHOLDS: [u64; 4] = [20_000, 50_000, 100_000, 250_000];
/// Quality floor below which a candidate is not worth perturbing.
pub const QUALITY_FLOOR: f64 = 1e-4;
/// Temperature dividing Q-values before the Gumbel perturbation.
pub const ENTROPY_ALPHA: f64 = 0.1;

/// Tunables of a [`crate::agent::ReuseAgent`].
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory holding the local and sibling-platform model files.
    pub base_dir: PathBuf,
    /// Platform tag this session runs on.
    pub platform: String,
    /// Exploration rate of the ε-greedy fallback.
    pub epsilon: f64,
    /// Discount factor of the n-step return.
    pub gamma: f64,
    /// Floor of the learning-rate schedule.
    pub alpha_floor: f64,
    /// Length of the SARSA reward/action windows.
    pub sarsa_steps: usize,
    /// Similarity threshold for cross-platform action matching.
    pub match_threshold: f64,
    /// Interval of the background persistence task.
    pub save_interval: Duration,
    /// Fixed PRNG seed; entropy-seeded when absent.
    pub rng_seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/sdcard"),
            platform: "phone".to_owned(),
            epsilon: 0.05,
            gamma: 0.9,
            alpha_floor: 0.2,
            sarsa_steps: 5,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            save_interval: Duration::from_secs(120),
            rng_seed: None,
        }
    }
}

impl AgentConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model file directory.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Sets the platform tag.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Sets the ε-greedy exploration rate.
    #[must_use]
    pub const fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the discount factor.
    #[must_use]
    pub const fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Sets the background save interval.
    #[must_use]
    pub const fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Pins the PRNG seed for reproducible runs.
    #[must_use]
    pub const fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}
