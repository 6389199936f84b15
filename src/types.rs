use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// Execution context selected once per build.
///
/// - `Development`: fast, debuggable output (stages guarded by
///   `when = "development"` run, production-only stages are skipped).
/// - `Production`: minified/optimised output.
///
/// The value is chosen before a build starts and handed to every pipeline
/// invocation; nothing mutates it while tasks are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    Production,
}

impl Default for BuildMode {
    fn default() -> Self {
        BuildMode::Development
    }
}

impl BuildMode {
    pub fn is_production(self) -> bool {
        matches!(self, BuildMode::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Production => "production",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(BuildMode::Development),
            "production" | "prod" => Ok(BuildMode::Production),
            other => Err(format!(
                "invalid mode: {other} (expected \"development\" or \"production\")"
            )),
        }
    }
}

/// Content kind flowing between transform stages (e.g. `"scss"`, `"css"`).
///
/// `"*"` is the wildcard kind: a stage declaring it accepts or produces
/// anything, and it is compatible with every other kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKind(String);

impl ContentKind {
    pub const ANY: &'static str = "*";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into().trim().to_lowercase())
    }

    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    /// Guess a kind from a file extension; unknown or missing extensions map
    /// to the wildcard.
    pub fn from_extension(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if !ext.is_empty() => Self::new(ext),
            _ => Self::any(),
        }
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }

    /// Whether output of kind `self` may feed a stage expecting `next`.
    pub fn feeds(&self, next: &ContentKind) -> bool {
        self.is_any() || next.is_any() || self == next
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContentKind {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
