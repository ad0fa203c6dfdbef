//! Configuration document loading.
//!
//! The top-level entry points are [`Config::load`] and [`Config::from_json_str`].
//! Every object rejects unknown fields, and regular expressions are compiled
//! while loading so a bad pattern is reported before any child is spawned.

use crate::effects::Effect;
use crate::matcher::Pattern;
use crate::template::{self, Vars};
use anyhow::{Context as _, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A loaded, validated configuration. Never mutated after load.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Inter-character delay for injected input, in microseconds. 0 disables pacing.
    pub write_char_delay_us: u64,
    /// argv of the child program.
    pub program: Vec<String>,
    /// Actions in scan priority order.
    pub actions: Vec<Action>,
    /// Initial variable bindings.
    #[serde(default)]
    pub args: Vars,
    #[serde(default)]
    pub tftp: Option<TftpConfig>,
    /// Directory `write_from_file` paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Read and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, has
    /// unknown or missing fields, names an empty program, or contains a
    /// regular expression that does not compile.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_json_str(&content, base_dir)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse a configuration document from a string.
    ///
    /// `base_dir` is the directory relative `write_from_file` paths resolve against.
    ///
    /// # Example
    ///
    /// ```
    /// use ttyharness::Config;
    ///
    /// let config = Config::from_json_str(
    ///     r#"{"write_char_delay_us": 0, "program": ["sh"], "actions": []}"#,
    ///     ".",
    /// )
    /// .unwrap();
    /// assert_eq!(config.program, ["sh"]);
    /// ```
    pub fn from_json_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: Config =
            serde_json::from_str(content).context("Failed to parse config document")?;
        if config.program.is_empty() {
            return Err(anyhow!("`program` must name at least one argument"));
        }
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_micros(self.write_char_delay_us)
    }
}

/// Stable identity of an action: its index in [`Config::actions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub usize);

/// A pattern-to-effects rule evaluated against the child's output.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct Action {
    pub pattern: Pattern,
    pub effects: Vec<Effect>,
    pub oneshot: bool,
    pub reset_logs: bool,
    pub reset_oneshots: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MatchKind {
    Match,
    MatchRegex,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAction {
    #[serde(rename = "type")]
    kind: MatchKind,
    value: String,
    #[serde(default)]
    run: Option<Vec<Effect>>,
    #[serde(default)]
    oneshot: Option<bool>,
    #[serde(default)]
    reset_logs: Option<bool>,
    #[serde(default)]
    reset_oneshots: Option<bool>,
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let pattern = match raw.kind {
            MatchKind::Match => Pattern::literal(raw.value),
            MatchKind::MatchRegex => Pattern::regex(&raw.value)
                .map_err(|e| format!("invalid match_regex {:?}: {}", raw.value, e))?,
        };
        Ok(Action {
            pattern,
            effects: raw.run.unwrap_or_default(),
            oneshot: raw.oneshot.unwrap_or(false),
            reset_logs: raw.reset_logs.unwrap_or(false),
            reset_oneshots: raw.reset_oneshots.unwrap_or(false),
        })
    }
}

/// Settings for the embedded network boot (TFTP) server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TftpConfig {
    /// Listen address; `${name}` placeholders are substituted.
    pub server_ip: String,
    pub server_port: PortSpec,
    /// `[local_dir, remote_prefix]` pairs, tried in order.
    pub mounts: Vec<(String, String)>,
}

/// A port given either as a number or as a templated string such as `"${port}"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    Number(u16),
    Text(String),
}

impl TftpConfig {
    /// Resolve the listen address against the session variables.
    pub fn listen_addr(&self, vars: &Vars) -> Result<(String, u16)> {
        let ip = template::substitute_str(vars, &self.server_ip, None);
        if ip.is_empty() {
            return Err(anyhow!("TFTP server_ip resolved to an empty string"));
        }
        let port = match &self.server_port {
            PortSpec::Number(port) => *port,
            PortSpec::Text(text) => {
                let resolved = template::substitute_str(vars, text, None);
                resolved
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid TFTP server_port: {:?}", resolved))?
            }
        };
        Ok((ip, port))
    }
}
