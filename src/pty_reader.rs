use crate::event::Event;
use std::io::Read;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::UnboundedSender;

const READ_CHUNK: usize = 4096;

/// Spawns a background thread that forwards everything read from `reader`
/// as events built by `data`, then sends `closed` once on EOF or error.
pub fn spawn_reader<R>(
    name: &str,
    mut reader: R,
    tx: UnboundedSender<Event>,
    data: fn(Vec<u8>) -> Event,
    closed: Event,
) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let label = name.to_string();
    thread::Builder::new().name(label.clone()).spawn(move || {
        let mut buffer = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => {
                    tracing::debug!("{}: end of file", label);
                    break;
                }
                Ok(n) => {
                    if tx.send(data(buffer[..n].to_vec())).is_err() {
                        // Receiver dropped
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EIO from a pty master whose child side is gone is the
                    // normal end of a session.
                    tracing::debug!("{}: read ended: {}", label, e);
                    break;
                }
            }
        }
        let _ = tx.send(closed);
    })
}
