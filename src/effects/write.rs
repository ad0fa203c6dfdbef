//! [`Write`] effect: types literal text into the child.
//!
//! Config syntax: `{"type": "write", "value": "boot ${image}\n", "needed_args": ["image"]}`

use crate::effect::{Context, SessionEffect};
use crate::template;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Writes `value` to the child's input, paced by the configured delay.
///
/// Placeholders are only substituted when `needed_args` is given; an unbound
/// needed variable empties the text and nothing is written.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Write {
    pub value: String,
    #[serde(default)]
    pub needed_args: Option<Vec<String>>,
}

impl Write {
    pub const NAME: &'static str = "write";

    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            needed_args: None,
        }
    }

    /// Resolve the text to send against the current variables.
    pub fn resolve(&self, vars: &template::Vars) -> Vec<u8> {
        match &self.needed_args {
            Some(needed) => template::substitute_bytes(vars, self.value.as_bytes(), Some(needed)),
            None => self.value.as_bytes().to_vec(),
        }
    }
}

#[async_trait(?Send)]
impl SessionEffect for Write {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self, ctx: &mut Context<'_>) -> Result<()> {
        let data = self.resolve(ctx.vars());
        if data.is_empty() {
            tracing::debug!("Nothing to write");
            return Ok(());
        }
        ctx.write_paced(&data).await
    }
}
