use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::SettingsError;
use crate::model::{wanted_kinds, MeetingKind};

pub const CONFIG_FILE: &str = "tk_scraper.toml";
pub const ENV_PREFIX: &str = "TK";

pub const DEFAULT_FEED_URL: &str = "https://gegevensmagazijn.tweedekamer.nl/SyncFeed/2.0/Feed";
pub const DEFAULT_ODATA_URL: &str = "https://gegevensmagazijn.tweedekamer.nl/OData/v4/2.0";

/// Run settings. Layered: defaults, then `tk_scraper.toml`, then `TK_*`
/// environment variables. Command-line flags are applied on top by the binary.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub verbose: bool,
    /// Page budget per feed; 0 means unlimited.
    pub max_pages: usize,
    pub delay_ms: u64,
    pub include_committees: bool,
    pub concurrency: usize,
    pub keep_raw: bool,
    pub overwrite: bool,
    /// When set, meetings come from the filtered query instead of the feeds.
    pub since: Option<NaiveDate>,
    pub timeout_secs: u64,
    pub feed_url: String,
    pub odata_url: String,
    pub user_agent: String,
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        Self::build(Some(Path::new(CONFIG_FILE)), Environment::with_prefix(ENV_PREFIX))
    }

    fn build(file: Option<&Path>, env: Environment) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("output_dir", "output")?
            .set_default("verbose", false)?
            .set_default("max_pages", 50_i64)?
            .set_default("delay_ms", 250_i64)?
            .set_default("include_committees", false)?
            .set_default("concurrency", 4_i64)?
            .set_default("keep_raw", true)?
            .set_default("overwrite", false)?
            .set_default("timeout_secs", 30_i64)?
            .set_default("feed_url", DEFAULT_FEED_URL)?
            .set_default("odata_url", DEFAULT_ODATA_URL)?
            .set_default("user_agent", concat!("tk_scraper/", env!("CARGO_PKG_VERSION")))?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings: Settings = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.concurrency == 0 {
            return Err(SettingsError::Invalid("concurrency must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(SettingsError::Invalid("timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn page_budget(&self) -> Option<usize> {
        (self.max_pages > 0).then_some(self.max_pages)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kinds(&self) -> Vec<MeetingKind> {
        wanted_kinds(self.include_committees)
    }
}
