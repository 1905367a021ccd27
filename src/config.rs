//! Command line surface and the knobs that pace a harvest run.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::{
    API_BASE_URL, DEFAULT_WEEKS, EXIT_FAILURE, FILE_PATH, MAX_RETRIES, PAGE_DELAY_SECS,
    RATE_LIMIT_COOLDOWN_SECS, RETRY_BACKOFF_SECS,
};

/// Tunable knobs that bound a harvest run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarvestConfig {
    /// Csv file the library is read from and appended to.
    pub output: PathBuf,
    /// Maximum number of pages (weeks) processed in one run.
    pub max_pages: u32,
    /// Pause between two successful page fetches.
    pub page_delay: Duration,
    /// Pause after the upstream answered with 429.
    pub rate_limit_cooldown: Duration,
    /// Pause after an empty answer or a network failure.
    pub retry_backoff: Duration,
    /// Consecutive failed fetches of one cursor before the walk gives up.
    pub max_retries: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(FILE_PATH),
            max_pages: DEFAULT_WEEKS,
            page_delay: Duration::from_secs(PAGE_DELAY_SECS),
            rate_limit_cooldown: Duration::from_secs(RATE_LIMIT_COOLDOWN_SECS),
            retry_backoff: Duration::from_secs(RETRY_BACKOFF_SECS),
            max_retries: MAX_RETRIES,
        }
    }
}

/// Command-line interface of the `bestsellers` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "bestsellers", version, about = "NYT Best Seller library builder")]
pub struct Cli {
    /// Your NYT API key
    #[arg(env = "NYT_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Number of additional weeks to fetch
    #[arg(
        long,
        default_value_t = DEFAULT_WEEKS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub weeks: u32,

    /// Csv file holding the library
    #[arg(long, short, default_value = FILE_PATH)]
    pub output: PathBuf,

    /// Seconds to wait between pages
    #[arg(long, default_value_t = PAGE_DELAY_SECS)]
    pub delay: u64,

    /// Seconds to wait after being rate limited
    #[arg(long, default_value_t = RATE_LIMIT_COOLDOWN_SECS)]
    pub cooldown: u64,

    /// Seconds to wait after an empty answer or a network error
    #[arg(long, default_value_t = RETRY_BACKOFF_SECS)]
    pub backoff: u64,

    /// Consecutive failed fetches of one week before stopping
    #[arg(long, default_value_t = MAX_RETRIES)]
    pub max_retries: u32,

    /// Overview endpoint to query
    #[arg(long, env = "NYT_API_BASE_URL", default_value = API_BASE_URL)]
    pub api_base_url: String,
}

impl Cli {
    /// Builds the run configuration from the parsed arguments.
    pub fn build_config(&self) -> HarvestConfig {
        HarvestConfig {
            output: self.output.clone(),
            max_pages: self.weeks,
            page_delay: Duration::from_secs(self.delay),
            rate_limit_cooldown: Duration::from_secs(self.cooldown),
            retry_backoff: Duration::from_secs(self.backoff),
            max_retries: self.max_retries,
        }
    }
}

/// Exit status for an argument parse that didn't produce a [`Cli`]: `--help` and `--version`
/// succeed, usage errors are initialization failures.
pub fn usage_exit_status(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        EXIT_FAILURE
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_pacing() {
        let cli = Cli::try_parse_from(["bestsellers", "secret"]).expect("parse");
        assert_eq!(cli.api_key, "secret");
        assert_eq!(cli.build_config(), HarvestConfig::default());
    }

    #[test]
    fn weeks_and_output_are_overridable() {
        let cli = Cli::try_parse_from([
            "bestsellers",
            "secret",
            "--weeks",
            "3",
            "--output",
            "lib.csv",
            "--delay",
            "0",
        ])
        .expect("parse");
        let config = cli.build_config();
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.output, PathBuf::from("lib.csv"));
        assert_eq!(config.page_delay, Duration::ZERO);
    }

    #[test]
    fn zero_weeks_is_rejected() {
        assert!(Cli::try_parse_from(["bestsellers", "secret", "--weeks", "0"]).is_err());
    }

    #[test]
    fn usage_errors_are_init_failures_but_help_is_not() {
        let status = |args: &[&str]| {
            let err = Cli::try_parse_from(args).expect_err("parse should stop");
            usage_exit_status(&err)
        };

        assert_eq!(status(&["bestsellers", "secret", "--weeks", "0"]), EXIT_FAILURE);
        assert_eq!(status(&["bestsellers", "secret", "--weeks", "many"]), EXIT_FAILURE);
        assert_eq!(status(&["bestsellers", "secret", "--no-such-flag"]), EXIT_FAILURE);
        assert_eq!(status(&["bestsellers", "--help"]), 0);
        assert_eq!(status(&["bestsellers", "--version"]), 0);
    }
}
