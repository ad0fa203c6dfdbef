//! The operator's terminal: size, attributes and raw mode.
//!
//! Everything here works on stdin. When stdin is not a terminal the queries
//! return `None` and raw mode cannot be enabled; the session still runs.

use anyhow::{Context, Result};
use nix::sys::termios::{self, SetArg, Termios};
use std::io;

/// Size used when the operator's terminal size is unknown.
pub const DEFAULT_SIZE: (u16, u16) = (24, 80);

/// Current `(rows, cols)` of the operator's terminal.
pub fn window_size() -> Option<(u16, u16)> {
    let mut winsize = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ only writes into the winsize we pass.
    let ok = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &mut winsize) } == 0;
    if ok && winsize.ws_row > 0 && winsize.ws_col > 0 {
        Some((winsize.ws_row, winsize.ws_col))
    } else {
        None
    }
}

/// [`window_size`], or [`DEFAULT_SIZE`].
pub fn window_size_or_default() -> (u16, u16) {
    window_size().unwrap_or(DEFAULT_SIZE)
}

/// The operator's terminal attributes.
pub fn attributes() -> Option<Termios> {
    match termios::tcgetattr(io::stdin()) {
        Ok(attrs) => Some(attrs),
        Err(e) => {
            tracing::warn!("Cannot read terminal attributes: {}", e);
            None
        }
    }
}

/// Puts stdin into raw mode and restores the original attributes exactly
/// once: on [`restore`](Self::restore) or on drop, whichever comes first.
pub struct RawMode {
    original: Option<Termios>,
}

impl RawMode {
    pub fn enable() -> Result<Self> {
        let stdin = io::stdin();
        let original = termios::tcgetattr(&stdin).context("Failed to read terminal attributes")?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw).context("Failed to enable raw mode")?;
        tracing::debug!("Enabled raw mode");
        Ok(RawMode {
            original: Some(original),
        })
    }

    pub fn restore(&mut self) {
        let Some(original) = self.original.take() else {
            return;
        };
        match termios::tcsetattr(io::stdin(), SetArg::TCSADRAIN, &original) {
            Ok(()) => tracing::debug!("Restored terminal mode"),
            Err(e) => tracing::warn!("Failed to restore terminal mode: {}", e),
        }
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_fallback_is_sane() {
        let (rows, cols) = window_size_or_default();
        assert!(rows > 0 && cols > 0);
    }

    #[test]
    fn test_restore_runs_once() {
        let mut mode = RawMode { original: None };
        mode.restore();
        mode.restore();
        assert!(mode.original.is_none());
    }
}
