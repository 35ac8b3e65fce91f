//! Run configuration
//!
//! Built in three layers: defaults (or a JSON config file), then environment
//! overrides, then command-line flags.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BANGUMI_FILTER_PARALLEL` | `false` | Evaluate on the rayon pool |
//! | `BANGUMI_FILTER_EXHAUSTIVE` | `false` | Capture every matching linked entity |

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FilterError, Result};
use crate::query::EvalOptions;

pub const ENV_PARALLEL: &str = "BANGUMI_FILTER_PARALLEL";
pub const ENV_EXHAUSTIVE: &str = "BANGUMI_FILTER_EXHAUSTIVE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the archive dump
    pub archive_dir: PathBuf,
    pub subjects_file: String,
    pub relations_file: String,
    pub staff_file: String,
    pub episodes_file: String,
    /// Results go to `<prefix>.jsonlines` and `<prefix>.csv`
    pub output_prefix: String,
    pub parallel: bool,
    pub exhaustive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            archive_dir: PathBuf::from("bangumi_archive"),
            subjects_file: "subject.jsonlines".to_string(),
            relations_file: "subject-relations.jsonlines".to_string(),
            staff_file: "subject-persons.jsonlines".to_string(),
            episodes_file: "episode.jsonlines".to_string(),
            output_prefix: "filtered_results".to_string(),
            parallel: false,
            exhaustive: false,
        }
    }
}

impl Config {
    /// Read a JSON config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `BANGUMI_FILTER_*` variables on top of the current values
    pub fn with_env_overrides(mut self) -> Self {
        self.parallel = parse_bool_env(ENV_PARALLEL, self.parallel);
        self.exhaustive = parse_bool_env(ENV_EXHAUSTIVE, self.exhaustive);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let names = [
            ("subjects_file", &self.subjects_file),
            ("relations_file", &self.relations_file),
            ("staff_file", &self.staff_file),
            ("episodes_file", &self.episodes_file),
            ("output_prefix", &self.output_prefix),
        ];
        for (key, value) in names {
            if value.trim().is_empty() {
                return Err(FilterError::Config(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }

    pub fn subjects_path(&self) -> PathBuf {
        self.archive_dir.join(&self.subjects_file)
    }

    pub fn relations_path(&self) -> PathBuf {
        self.archive_dir.join(&self.relations_file)
    }

    pub fn staff_path(&self) -> PathBuf {
        self.archive_dir.join(&self.staff_file)
    }

    pub fn episodes_path(&self) -> PathBuf {
        self.archive_dir.join(&self.episodes_file)
    }

    pub fn jsonl_output(&self) -> PathBuf {
        PathBuf::from(format!("{}.jsonlines", self.output_prefix))
    }

    pub fn csv_output(&self) -> PathBuf {
        PathBuf::from(format!("{}.csv", self.output_prefix))
    }

    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions { exhaustive: self.exhaustive }
    }
}

/// Parse a boolean environment variable: true/1/yes/on, false/0/no/off.
/// Anything else (or unset) keeps `default`.
fn parse_bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|val| match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}
