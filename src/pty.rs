use crate::effect::ChildInput;
use anyhow::{Context, Result, anyhow};
use nix::sys::signal::{self, Signal};
use nix::sys::termios::{self, SetArg, Termios};
use nix::unistd::Pid;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::os::fd::BorrowedFd;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Manages a program running inside a PTY
pub struct PtySession {
    master: Option<Box<dyn MasterPty + Send>>,
    child: Box<dyn Child + Send + Sync>,
    writer: Option<Box<dyn Write + Send>>,
}

impl PtySession {
    /// Spawn `program` in a new PTY of the given size, returning the session
    /// and the master's reader separately.
    ///
    /// When `attrs` is given the terminal attributes are copied onto the PTY
    /// before the child starts. Failing to do so is only a warning.
    pub fn spawn(
        program: &[String],
        size: PtySize,
        attrs: Option<&Termios>,
    ) -> Result<(Self, Box<dyn Read + Send>)> {
        let (command, args) = program
            .split_first()
            .ok_or_else(|| anyhow!("No program to run"))?;

        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system.openpty(size).context("Failed to open PTY")?;

        if let Some(attrs) = attrs {
            copy_attributes(pair.master.as_ref(), attrs);
        }

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {}", command))?;
        // The child holds its own copy; ours would keep the PTY open after it exits.
        drop(pair.slave);
        tracing::info!("Spawned {:?} (pid {:?})", program, child.process_id());

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        let session = PtySession {
            master: Some(pair.master),
            child,
            writer: Some(writer),
        };

        Ok((session, reader))
    }

    /// Write data to the program's stdin
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("PTY is closed"))?;
        writer.write_all(data).context("Failed to write to PTY")?;
        writer.flush().context("Failed to write to PTY")?;
        Ok(())
    }

    /// Resize the PTY
    pub fn resize(&self, size: PtySize) -> Result<()> {
        if let Some(master) = &self.master {
            tracing::debug!("Resize PTY to {}x{}", size.rows, size.cols);
            master.resize(size).context("Failed to resize PTY")?;
        }
        Ok(())
    }

    /// Close the PTY, ask the child to terminate and wait for it.
    ///
    /// Dropping the master here does not hang up the child on its own: the
    /// reader thread still holds its clone of the master until its blocking
    /// read fails. Termination comes from the signals that follow. Once the
    /// child is gone the slave side closes and that read ends too.
    ///
    /// The child gets `grace` to exit after `SIGTERM` before it is killed.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<()> {
        self.writer.take();
        self.master.take();
        tracing::info!("Closed PTY master");

        if let Some(status) = self.child.try_wait().context("Failed to poll child")? {
            tracing::info!("Child already exited: {:?}", status);
            return Ok(());
        }

        if let Some(pid) = self.child.process_id() {
            tracing::info!("Sending SIGTERM to {}", pid);
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!("Failed to signal child {}: {}", pid, e);
            }
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait().context("Failed to poll child")? {
                tracing::info!("Child exited: {:?}", status);
                return Ok(());
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }

        tracing::warn!("Child did not exit within {:?}, killing it", grace);
        if let Err(e) = self.child.kill() {
            tracing::warn!("Failed to kill child: {}", e);
        }
        let status = self.child.wait().context("Failed to wait for child")?;
        tracing::info!("Child exited: {:?}", status);
        Ok(())
    }
}

impl ChildInput for PtySession {
    fn write_input(&mut self, data: &[u8]) -> Result<()> {
        self.write(data)
    }
}

fn copy_attributes(master: &dyn MasterPty, attrs: &Termios) {
    let Some(fd) = master.as_raw_fd() else {
        tracing::warn!("PTY master has no file descriptor; attributes not copied");
        return;
    };
    // SAFETY: `fd` belongs to `master`, which outlives this call.
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    if let Err(e) = termios::tcsetattr(fd, SetArg::TCSANOW, attrs) {
        tracing::warn!("Failed to copy terminal attributes to PTY: {}", e);
    }
}

/// Build a [`PtySize`] from rows and columns.
pub fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}
