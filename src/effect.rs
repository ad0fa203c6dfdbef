//! The [`SessionEffect`] trait and the [`Context`] effects receive when an action fires.

use crate::state::SessionState;
use crate::template::Vars;
use crate::transcript::Transcript;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Something that accepts bytes destined for the child's input.
pub trait ChildInput {
    fn write_input(&mut self, data: &[u8]) -> Result<()>;
}

impl ChildInput for Vec<u8> {
    fn write_input(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Execution context passed to [`SessionEffect::apply`].
///
/// Provides the session variables, the transcript and its log files, and the
/// child's input stream with the configured per-byte pacing.
pub struct Context<'a> {
    pub(crate) state: &'a mut SessionState,
    pub(crate) transcript: &'a mut Transcript,
    pub(crate) input: &'a mut dyn ChildInput,
    pub(crate) base_dir: &'a Path,
    pub(crate) write_delay: Duration,
}

impl<'a> Context<'a> {
    pub fn new(
        state: &'a mut SessionState,
        transcript: &'a mut Transcript,
        input: &'a mut dyn ChildInput,
        base_dir: &'a Path,
        write_delay: Duration,
    ) -> Self {
        Context {
            state,
            transcript,
            input,
            base_dir,
            write_delay,
        }
    }

    pub fn vars(&self) -> &Vars {
        self.state.vars()
    }

    pub fn state(&mut self) -> &mut SessionState {
        &mut *self.state
    }

    pub fn transcript(&mut self) -> &mut Transcript {
        &mut *self.transcript
    }

    /// Directory relative file paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        self.base_dir
    }

    /// Write `data` to the child one byte at a time, sleeping the configured
    /// delay before each byte. With no delay the bytes go out in one write.
    ///
    /// The whole session waits while this runs; nothing is read from the
    /// child in the meantime.
    pub async fn write_paced(&mut self, data: &[u8]) -> Result<()> {
        tracing::debug!("Writing {:?}", String::from_utf8_lossy(data));
        if self.write_delay.is_zero() {
            return self.input.write_input(data);
        }
        for byte in data {
            sleep(self.write_delay).await;
            self.input.write_input(std::slice::from_ref(byte))?;
        }
        Ok(())
    }
}

/// One operation an action performs when it fires.
///
/// Implement this trait to add a new effect kind. Then:
///
/// 1. Define `pub const NAME: &'static str` on your struct: the `type`
///    value used in the configuration document.
/// 2. Re-export the struct from `src/effects/mod.rs`.
/// 3. Add a variant to [`crate::effects::Effect`] and its dispatch arm.
#[async_trait(?Send)]
pub trait SessionEffect {
    /// The effect's `type` name as it appears in configuration.
    fn name(&self) -> &'static str;

    /// Run the effect against the session.
    async fn apply(&self, ctx: &mut Context<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_write_paced_without_delay() {
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
        ctx.write_paced(b"boot\n").await.unwrap();
        assert_eq!(input, b"boot\n");
    }

    #[tokio::test]
    async fn test_write_paced_sleeps_per_byte() {
        let mut state = SessionState::default();
        let mut transcript = Transcript::new();
        let mut input = Vec::new();
        let mut ctx = Context::new(
            &mut state,
            &mut transcript,
            &mut input,
            Path::new("."),
            Duration::from_millis(5),
        );
        let start = Instant::now();
        ctx.write_paced(b"abcd").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(input, b"abcd");
    }
}
