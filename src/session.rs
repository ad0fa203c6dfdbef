//! The per-chunk pipeline that ties matching, effects, the screen model and
//! the transcript together.
//!
//! A [`Session`] owns no I/O of its own. The [`Engine`](crate::Engine) hands
//! it every chunk of child output together with the child's input stream, and
//! asks for a final snapshot when the child goes away.

use crate::config::{Action, ActionId, Config};
use crate::effect::{ChildInput, Context};
use crate::matcher::{self, MatchWindow};
use crate::screen::Screen;
use crate::state::SessionState;
use crate::template::Vars;
use crate::transcript::Transcript;
use anyhow::{Context as _, Result};
use std::sync::Arc;

pub struct Session {
    config: Arc<Config>,
    state: SessionState,
    window: MatchWindow,
    screen: Screen,
    transcript: Transcript,
}

impl Session {
    /// Create a session with `vars` bound and a `rows` x `cols` screen.
    pub fn new(config: Arc<Config>, vars: Vars, rows: usize, cols: usize) -> Self {
        Session {
            config,
            state: SessionState::with_vars(vars),
            window: MatchWindow::default(),
            screen: Screen::new(rows, cols),
            transcript: Transcript::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Handle one chunk of child output.
    ///
    /// Actions are polled in configuration order and fire immediately, so an
    /// action sees the oneshot and variable changes made by the ones before
    /// it. The screen is fed after matching. When a `reset_logs` action
    /// fires, the part of the chunk ahead of its match goes to the old logs
    /// first; the rest, trigger included, lands in the fresh ones.
    pub async fn process_output(&mut self, data: &[u8], input: &mut dyn ChildInput) -> Result<()> {
        tracing::trace!("Received {:?}", String::from_utf8_lossy(data));
        self.window.push(data);
        let chunk_start = self.window.total() - data.len() as u64;
        let mut fed = 0;

        let config = Arc::clone(&self.config);
        for (idx, action) in config.actions.iter().enumerate() {
            let id = ActionId(idx);
            let Some(offset) = matcher::poll(id, action, &self.window, &mut self.state) else {
                continue;
            };
            if action.reset_logs {
                let cut = (offset.saturating_sub(chunk_start) as usize).min(data.len());
                if cut > fed {
                    self.feed_screen(&data[fed..cut])?;
                    self.update_tail()?;
                    fed = cut;
                }
            }
            self.fire(id, action, &mut *input).await?;
        }

        self.feed_screen(&data[fed..])?;
        self.update_tail()
    }

    fn feed_screen(&mut self, data: &[u8]) -> Result<()> {
        self.screen
            .feed(data, &mut self.transcript)
            .context("Failed to commit scrolled rows")
    }

    /// Apply a terminal size change to the screen model.
    pub fn resize(&mut self, rows: usize, cols: usize) -> Result<()> {
        tracing::debug!("Resize screen to {}x{}", rows, cols);
        self.screen
            .resize(rows, cols, &mut self.transcript)
            .context("Failed to commit scrolled rows")?;
        self.update_tail()
    }

    /// Flush the final screen contents as the transcript tail.
    pub fn finish(&mut self) -> Result<()> {
        tracing::info!("Flushing final screen");
        self.update_tail()
    }

    fn update_tail(&mut self) -> Result<()> {
        self.transcript
            .update_tail(&self.screen.snapshot())
            .context("Failed to update log files")
    }

    async fn fire(&mut self, id: ActionId, action: &Action, input: &mut dyn ChildInput) -> Result<()> {
        tracing::info!("Running action #{}", id.0);

        if action.reset_logs {
            self.transcript.reset();
            self.screen.clear();
        }
        if action.reset_oneshots {
            self.state.reset_oneshots();
        }
        if action.oneshot {
            self.state.mark_fired(id);
        }

        let mut ctx = Context::new(
            &mut self.state,
            &mut self.transcript,
            input,
            &self.config.base_dir,
            self.config.write_delay(),
        );
        for effect in &action.effects {
            tracing::debug!("Applying {} effect", effect.name());
            effect
                .apply(&mut ctx)
                .await
                .with_context(|| format!("Action #{} failed in {} effect", id.0, effect.name()))?;
        }
        Ok(())
    }
}
