//! [`SetArg`] effect: binds a session variable.
//!
//! Config syntax: `{"type": "set_arg", "name": "stage", "value": "kernel"}`

use crate::effect::{Context, SessionEffect};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Binds `name` to `value`. The value is stored verbatim.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetArg {
    pub name: String,
    pub value: String,
}

impl SetArg {
    pub const NAME: &'static str = "set_arg";
}

#[async_trait(?Send)]
impl SessionEffect for SetArg {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self, ctx: &mut Context<'_>) -> Result<()> {
        ctx.state().set_var(&self.name, &self.value);
        Ok(())
    }
}
