//! The effect kinds an action can run, one file per kind.

mod add_log_file;
mod set_arg;
mod write;
mod write_from_file;

pub use add_log_file::AddLogFile;
pub use set_arg::SetArg;
pub use write::Write;
pub use write_from_file::WriteFromFile;

use crate::effect::{Context, SessionEffect};
use anyhow::Result;
use serde::Deserialize;

/// A configured effect, tagged by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Write(Write),
    WriteFromFile(WriteFromFile),
    SetArg(SetArg),
    AddLogFile(AddLogFile),
}

impl Effect {
    fn inner(&self) -> &dyn SessionEffect {
        match self {
            Effect::Write(e) => e,
            Effect::WriteFromFile(e) => e,
            Effect::SetArg(e) => e,
            Effect::AddLogFile(e) => e,
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner().name()
    }

    pub async fn apply(&self, ctx: &mut Context<'_>) -> Result<()> {
        self.inner().apply(ctx).await
    }
}
