//! [`WriteFromFile`] effect: types the contents of a file into the child.
//!
//! Config syntax: `{"type": "write_from_file", "value": "${board}/env.txt", "needed_args": ["board"]}`

use crate::effect::{Context, SessionEffect};
use crate::template;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// Reads `value` (relative to the configuration file's directory) and writes
/// its bytes to the child.
///
/// With `needed_args`, both the path and the file contents are templated.
/// A read failure is an error and ends the session.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteFromFile {
    pub value: String,
    #[serde(default)]
    pub needed_args: Option<Vec<String>>,
}

impl WriteFromFile {
    pub const NAME: &'static str = "write_from_file";
}

#[async_trait(?Send)]
impl SessionEffect for WriteFromFile {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self, ctx: &mut Context<'_>) -> Result<()> {
        let needed = self.needed_args.as_deref();
        let relative = match needed {
            Some(needed) => template::substitute_str(ctx.vars(), &self.value, Some(needed)),
            None => self.value.clone(),
        };
        if relative.is_empty() {
            tracing::debug!("No file to write");
            return Ok(());
        }

        let path = ctx.base_dir().join(&relative);
        tracing::info!("Write from file {}", path.display());
        let content = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let data = match needed {
            Some(needed) => template::substitute_bytes(ctx.vars(), &content, Some(needed)),
            None => content,
        };
        if data.is_empty() {
            return Ok(());
        }
        ctx.write_paced(&data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionState;
    use crate::template::Vars;
    use crate::transcript::Transcript;
    use std::path::Path;
    use std::time::Duration;

    async fn run(effect: &WriteFromFile, vars: Vars, base: &Path) -> Result<Vec<u8>> {
        let mut state = SessionState::with_vars(vars);
        let mut transcript = Transcript::new();
        let mut input = Vec::new();
        let mut ctx = Context::new(&mut state, &mut transcript, &mut input, base, Duration::ZERO);
        effect.apply(&mut ctx).await?;
        Ok(input)
    }

    #[tokio::test]
    async fn test_reads_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("env.txt"), "setenv a ${a}\n").unwrap();
        let effect = WriteFromFile {
            value: "env.txt".into(),
            needed_args: None,
        };
        let input = run(&effect, Vars::new(), dir.path()).await.unwrap();
        assert_eq!(input, b"setenv a ${a}\n");
    }

    #[tokio::test]
    async fn test_path_and_contents_templated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("rpi")).unwrap();
        std::fs::write(dir.path().join("rpi/env.txt"), "setenv board ${board}\n").unwrap();
        let effect = WriteFromFile {
            value: "${board}/env.txt".into(),
            needed_args: Some(vec!["board".into()]),
        };
        let vars = Vars::from([("board".to_string(), "rpi".to_string())]);
        let input = run(&effect, vars, dir.path()).await.unwrap();
        assert_eq!(input, b"setenv board rpi\n");
    }

    #[tokio::test]
    async fn test_unbound_path_arg_skips() {
        let dir = tempfile::tempdir().unwrap();
        let effect = WriteFromFile {
            value: "${board}/env.txt".into(),
            needed_args: Some(vec!["board".into()]),
        };
        let input = run(&effect, Vars::new(), dir.path()).await.unwrap();
        assert!(input.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let effect = WriteFromFile {
            value: "absent.txt".into(),
            needed_args: None,
        };
        assert!(run(&effect, Vars::new(), dir.path()).await.is_err());
    }
}
