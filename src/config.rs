//! Config handling

use std::path::PathBuf;
use std::time::Duration;

use tracing::log::LevelFilter;

use crate::cli::CliOptions;
use crate::constants::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_TOTAL_BUDGET,
};

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// How hard we try a remote call before giving up on it.
///
/// Each attempt gets `attempt_timeout`, clamped to whatever is left of
/// `total_budget`, so all attempts together never exceed the budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Timeout applied to one attempt.
    pub attempt_timeout: Duration,
    /// Ceiling for all attempts and backoff sleeps combined.
    pub total_budget: Duration,
    /// Sleep before the second attempt; doubled for each later one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            total_budget: DEFAULT_TOTAL_BUDGET,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Sleep before the given attempt (1-based). Zero for the first.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let doublings = (attempt - 2).min(16);
        self.backoff.saturating_mul(1 << doublings)
    }

    /// Timeout for an attempt given how much budget remains.
    pub fn timeout_within(&self, remaining: Duration) -> Duration {
        self.attempt_timeout.min(remaining)
    }
}

/// Sampling parameters sent with every text generation request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationParams {
    /// Sampling temperature
    pub temperature: f32,
    /// Top-k sampling cutoff
    pub top_k: u32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Cap on generated tokens
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

/// Everything the pipeline needs besides the theme itself.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// API root, eg `https://generativelanguage.googleapis.com/v1beta`
    pub api_base: String,
    /// Text model identifier
    pub text_model: String,
    /// Image model identifier
    pub image_model: String,
    /// Number of grid stickers
    pub sticker_count: usize,
    /// Retry/timeout policy for every remote call
    pub retry: RetryPolicy,
    /// Text sampling parameters
    pub params: GenerationParams,
    /// Font used for captions and placeholders; system discovery when unset
    pub font_path: Option<PathBuf>,
    /// Render every slot locally without calling the API
    pub offline: bool,
}

impl From<&CliOptions> for PipelineConfig {
    fn from(cli: &CliOptions) -> Self {
        let retry = RetryPolicy {
            max_attempts: cli.attempts.max(1),
            attempt_timeout: Duration::from_secs(cli.timeout_secs),
            total_budget: Duration::from_secs(cli.budget_secs.max(cli.timeout_secs)),
            ..RetryPolicy::default()
        };
        Self {
            api_base: cli.api_base.trim_end_matches('/').to_string(),
            text_model: cli.text_model.clone(),
            image_model: cli.image_model.clone(),
            sticker_count: cli.count,
            retry,
            params: GenerationParams::default(),
            font_path: cli.font.clone(),
            offline: cli.offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_after_first_retry() {
        let policy = RetryPolicy {
            backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_before(1), Duration::ZERO);
        assert_eq!(policy.backoff_before(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_before(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_before(4), Duration::from_millis(400));
    }

    #[test]
    fn attempt_timeout_is_clamped_to_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.timeout_within(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.timeout_within(Duration::from_secs(600)),
            policy.attempt_timeout
        );
    }

    #[test]
    fn cli_options_map_onto_pipeline_config() {
        use clap::Parser;

        let cli = CliOptions::parse_from([
            "stickerpack",
            "上班族的日常",
            "--count",
            "4",
            "--timeout-secs",
            "30",
            "--budget-secs",
            "10",
            "--api-base",
            "http://localhost:1234/v1/",
        ]);
        let config = PipelineConfig::from(&cli);
        assert_eq!(config.sticker_count, 4);
        assert_eq!(config.api_base, "http://localhost:1234/v1");
        assert_eq!(config.retry.attempt_timeout, Duration::from_secs(30));
        // the budget never undercuts a single attempt
        assert_eq!(config.retry.total_budget, Duration::from_secs(30));
        assert!(!config.offline);
    }

    #[test]
    fn default_policy_matches_remote_limits() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.attempt_timeout >= Duration::from_secs(60));
        assert!(policy.total_budget <= Duration::from_secs(90));
    }
}
