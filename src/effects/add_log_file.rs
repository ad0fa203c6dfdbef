//! [`AddLogFile`] effect: starts mirroring the transcript into a file.
//!
//! Config syntax: `{"type": "add_log_file", "name": "${board}-boot.log"}`

use crate::effect::{Context, SessionEffect};
use crate::template;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Opens the log file `name`, seeded with the transcript so far.
///
/// The name is always templated: against `needed_args` when given, otherwise
/// against every bound variable. Opening an already open name does nothing.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddLogFile {
    pub name: String,
    #[serde(default)]
    pub needed_args: Option<Vec<String>>,
}

impl AddLogFile {
    pub const NAME: &'static str = "add_log_file";
}

#[async_trait(?Send)]
impl SessionEffect for AddLogFile {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self, ctx: &mut Context<'_>) -> Result<()> {
        let name = template::substitute_str(ctx.vars(), &self.name, self.needed_args.as_deref());
        if name.is_empty() {
            tracing::warn!("Log file name {:?} resolved to nothing", self.name);
            return Ok(());
        }
        ctx.transcript().add_sink(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionState;
    use crate::transcript::Transcript;
    use std::path::Path;
    use std::time::Duration;

    #[tokio::test]
    async fn test_opens_templated_name_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = SessionState::default();
        state.set_var("dir", dir.path().to_string_lossy());
        state.set_var("board", "rpi");
        let mut transcript = Transcript::new();
        transcript.push_row(b"earlier\n").unwrap();
        let mut input = Vec::new();
        let mut ctx = Context::new(
            &mut state,
            &mut transcript,
            &mut input,
            Path::new("."),
            Duration::ZERO,
        );
        let effect = AddLogFile {
            name: "${dir}/${board}.log".into(),
            needed_args: None,
        };
        effect.apply(&mut ctx).await.unwrap();

        let path = dir.path().join("rpi.log");
        assert!(transcript.has_sink(&path.to_string_lossy()));
        assert_eq!(std::fs::read(&path).unwrap(), b"earlier\n");
    }

    #[tokio::test]
    async fn test_unbound_needed_arg_opens_nothing() {
        let mut state = SessionState::default();
        let mut transcript = Transcript::new();
        let mut input = Vec::new();
        let mut ctx = Context::new(
            &mut state,
            &mut transcript,
            &mut input,
            Path::new("."),
            Duration::ZERO,
        );
        let effect = AddLogFile {
            name: "${stage}.log".into(),
            needed_args: Some(vec!["stage".into()]),
        };
        effect.apply(&mut ctx).await.unwrap();
        assert!(!transcript.has_sink("${stage}.log"));
        assert!(!transcript.has_sink(".log"));
    }
}
