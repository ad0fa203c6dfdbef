//! # ttyharness
//!
//! Unattended console automation over a pseudo-terminal.
//!
//! `ttyharness` runs a program (typically a serial console client such as
//! `picocom`) inside a PTY, passes everything it prints through to the
//! operator, and reacts to configured patterns in that output by typing
//! input, binding variables and opening log files. Log files hold a settled
//! transcript: rows that scrolled off the screen followed by the current
//! screen, so redraws and cursor movement do not pile up in the log.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ttyharness::{Config, Engine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_json_str(
//!         r#"{
//!             "write_char_delay_us": 20000,
//!             "program": ["picocom", "-b", "115200", "/dev/ttyUSB0"],
//!             "actions": [
//!                 {"type": "match", "value": "Hit any key to stop autoboot",
//!                  "oneshot": true, "run": [{"type": "write", "value": "\n"}]},
//!                 {"type": "match_regex", "value": "=> $",
//!                  "reset_logs": true,
//!                  "run": [{"type": "add_log_file", "name": "uboot.log"}]}
//!             ]
//!         }"#,
//!         ".",
//!     )?;
//!     let config = Arc::new(config);
//!     let vars = config.args.clone();
//!     Engine::spawn(config, vars)?.run().await
//! }
//! ```
//!
//! ## Configuration
//!
//! | Action field | Meaning |
//! |--------------|---------|
//! | `type` | `match` (literal) or `match_regex` |
//! | `value` | The pattern |
//! | `run` | Effects to run, in order |
//! | `oneshot` | Fire at most once until another action resets oneshots |
//! | `reset_logs` | Close all log files and forget the transcript first |
//! | `reset_oneshots` | Re-arm every oneshot action first |
//!
//! | Effect `type` | Fields |
//! |---------------|--------|
//! | `write` | `value`, optional `needed_args` |
//! | `write_from_file` | `value` (path relative to the config file), optional `needed_args` |
//! | `set_arg` | `name`, `value` |
//! | `add_log_file` | `name`, optional `needed_args` |
//!
//! `${name}` placeholders are substituted from the session variables. When a
//! needed variable is unbound the whole value becomes empty and the effect
//! does nothing.
//!
//! ## Driving a session without a PTY
//!
//! [`Session`] holds all matching and logging logic and works on any
//! [`ChildInput`]; a `Vec<u8>` collects what would have been typed:
//!
//! ```
//! use std::sync::Arc;
//! use ttyharness::{Config, Session, Vars};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::from_json_str(
//!     r#"{"write_char_delay_us": 0, "program": ["sh"], "actions": [
//!         {"type": "match", "value": "login: ", "oneshot": true,
//!          "run": [{"type": "write", "value": "root\n"}]}
//!     ]}"#,
//!     ".",
//! )?;
//! let mut session = Session::new(Arc::new(config), Vars::new(), 24, 80);
//! let mut typed = Vec::new();
//! session.process_output(b"box login: ", &mut typed).await?;
//! session.process_output(b"\r\nbox login: ", &mut typed).await?;
//! assert_eq!(typed, b"root\n");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod effect;
pub mod effects;
pub mod engine;
pub mod event;
pub mod logging;
pub mod matcher;
pub(crate) mod pty;
pub(crate) mod pty_reader;
pub mod screen;
pub mod session;
pub mod state;
pub mod template;
pub mod terminal;
pub mod tftp;
pub mod transcript;

pub use config::{Action, ActionId, Config, TftpConfig};
pub use effect::{ChildInput, Context, SessionEffect};
pub use effects::{AddLogFile, Effect, SetArg, Write, WriteFromFile};
pub use engine::Engine;
pub use screen::{Screen, ScrollbackObserver};
pub use session::Session;
pub use state::SessionState;
pub use template::Vars;
pub use transcript::Transcript;
