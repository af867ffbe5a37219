use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Which implementation sits on the target side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// The target is the reference implementation itself.
    Reference,
    #[default]
    Compatible,
}

impl FromStr for TargetKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" => Ok(Self::Reference),
            "compatible" => Ok(Self::Compatible),
            other => Err(HarnessError::Config(format!(
                "unknown target {other:?}, expected reference or compatible"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub target: TargetKind,
    /// Scenarios run at once by a suite.
    pub parallelism: usize,
    /// Per-scenario deadline, on top of the setup's own context.
    pub timeout_secs: Option<u64>,
    /// `tracing` filter directive.
    pub log: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target: TargetKind::Compatible,
            parallelism: 4,
            timeout_secs: None,
            log: "info".into(),
        }
    }
}

impl HarnessConfig {
    /// Read `COMPAT_TARGET`, `COMPAT_PARALLELISM`, `COMPAT_TIMEOUT_SECS` and
    /// `COMPAT_LOG`, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HarnessError> {
        let mut config = Self::default();
        if let Some(target) = lookup("COMPAT_TARGET") {
            config.target = target.parse()?;
        }
        if let Some(n) = lookup("COMPAT_PARALLELISM") {
            config.parallelism = parse_number("COMPAT_PARALLELISM", &n)?;
        }
        if let Some(secs) = lookup("COMPAT_TIMEOUT_SECS") {
            config.timeout_secs = Some(parse_number("COMPAT_TIMEOUT_SECS", &secs)?);
        }
        if let Some(log) = lookup("COMPAT_LOG") {
            config.log = log;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn reference_target(&self) -> bool {
        self.target == TargetKind::Reference
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if self.parallelism == 0 {
            return Err(HarnessError::Config("parallelism must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, HarnessError> {
    value
        .trim()
        .parse()
        .map_err(|_| HarnessError::Config(format!("{key}: invalid number {value:?}")))
}
