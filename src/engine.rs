use crate::config::Config;
use crate::event::Event;
use crate::pty::{PtySession, pty_size};
use crate::pty_reader::spawn_reader;
use crate::session::Session;
use crate::template::Vars;
use crate::terminal::{self, RawMode};
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::Instrument;

/// How long the child gets to exit after `SIGTERM` before it is killed.
pub const CHILD_EXIT_GRACE: Duration = Duration::from_secs(3);

/// Bridges the operator's terminal and a child running in a PTY, driving a
/// [`Session`] with everything the child prints.
pub struct Engine {
    config: Arc<Config>,
    pty: PtySession,
    session: Session,
    tx: UnboundedSender<Event>,
    rx: UnboundedReceiver<Event>,
}

impl Engine {
    /// Spawn the configured program in a PTY sized and configured like the
    /// operator's terminal, with `vars` bound in the session.
    pub fn spawn(config: Arc<Config>, vars: Vars) -> Result<Self> {
        let (rows, cols) = terminal::window_size_or_default();
        let attrs = terminal::attributes();
        let (pty, reader) = PtySession::spawn(&config.program, pty_size(rows, cols), attrs.as_ref())
            .context("Failed to start program")?;

        let (tx, rx) = unbounded_channel();
        spawn_reader("pty-reader", reader, tx.clone(), Event::Output, Event::OutputClosed)
            .context("Failed to start PTY reader")?;

        let session = Session::new(Arc::clone(&config), vars, rows as usize, cols as usize);
        Ok(Engine {
            config,
            pty,
            session,
            tx,
            rx,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until the child's output closes, the operator's input closes or a
    /// termination signal arrives, then tear the session down.
    ///
    /// Teardown always runs in the same order: final snapshot, terminal mode
    /// restore, PTY close, child termination.
    pub async fn run(mut self) -> Result<()> {
        let span = tracing::info_span!("session", program = %self.config.program.join(" "));
        async move {
            let mut raw_mode = match RawMode::enable() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    tracing::warn!("Not using raw mode: {:#}", e);
                    None
                }
            };

            let result = self.event_loop().await;
            if let Err(e) = &result {
                tracing::error!("Session failed: {:#}", e);
            }

            if let Err(e) = self.session.finish() {
                tracing::error!("Failed to flush final screen: {:#}", e);
            }
            if let Some(mode) = raw_mode.as_mut() {
                mode.restore();
            }
            if let Err(e) = self.pty.shutdown(CHILD_EXIT_GRACE).await {
                tracing::error!("Failed to stop child: {:#}", e);
            }
            tracing::info!("Session ended");
            result
        }
        .instrument(span)
        .await
    }

    async fn event_loop(&mut self) -> Result<()> {
        spawn_reader(
            "stdin-reader",
            io::stdin(),
            self.tx.clone(),
            Event::Input,
            Event::InputClosed,
        )
        .context("Failed to start input reader")?;
        self.listen_for_signals()?;

        let mut stdout = io::stdout();
        while let Some(event) = self.rx.recv().await {
            match event {
                Event::Input(data) => {
                    if let Err(e) = self.pty.write(&data) {
                        tracing::info!("Child input closed: {:#}", e);
                        break;
                    }
                }
                Event::Output(data) => {
                    if let Err(e) = stdout.write_all(&data).and_then(|()| stdout.flush()) {
                        tracing::info!("Operator output closed: {}", e);
                        break;
                    }
                    self.session.process_output(&data, &mut self.pty).await?;
                }
                Event::Resize => self.resize()?,
                Event::InputClosed => {
                    tracing::info!("Operator input closed");
                    break;
                }
                Event::OutputClosed => {
                    tracing::info!("Child output closed");
                    break;
                }
                Event::Terminate(name) => {
                    tracing::info!("Received {}", name);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Re-read the operator's window size and apply it to the PTY and the
    /// screen model.
    ///
    /// Terminal attributes are not copied again. By now the operator's
    /// terminal is in raw mode, and copying it would push raw mode onto the
    /// child; the attributes copied at spawn stay with the child.
    fn resize(&mut self) -> Result<()> {
        let Some((rows, cols)) = terminal::window_size() else {
            return Ok(());
        };
        self.pty.resize(pty_size(rows, cols))?;
        self.session.resize(rows as usize, cols as usize)
    }

    fn listen_for_signals(&self) -> Result<()> {
        let mut winch =
            signal(SignalKind::window_change()).context("Failed to listen for SIGWINCH")?;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while winch.recv().await.is_some() {
                if tx.send(Event::Resize).is_err() {
                    break;
                }
            }
        });

        for (kind, name) in [
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::hangup(), "SIGHUP"),
            (SignalKind::interrupt(), "SIGINT"),
        ] {
            let mut stream = signal(kind).with_context(|| format!("Failed to listen for {}", name))?;
            let tx = self.tx.clone();
            tokio::spawn(async move {
                if stream.recv().await.is_some() {
                    let _ = tx.send(Event::Terminate(name));
                }
            });
        }
        Ok(())
    }
}
