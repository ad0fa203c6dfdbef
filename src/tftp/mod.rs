//! Read-only TFTP server used to hand boot images to the device under test.
//!
//! The server runs as its own tokio task and shares nothing with the session
//! beyond the mount table and the address resolved before it starts. Every
//! read request is served from a fresh socket on its own task.

mod mounts;
mod packet;

pub use mounts::MountTable;
pub use packet::{Packet, PacketError};

use crate::config::TftpConfig;
use crate::template::Vars;
use anyhow::{Context, Result, bail};
use packet::{ERR_ACCESS_VIOLATION, ERR_ILLEGAL_OPERATION, ERR_NOT_FOUND, ERR_UNDEFINED};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

const DEFAULT_BLOCK_SIZE: usize = 512;
const MIN_BLOCK_SIZE: usize = 8;
const MAX_BLOCK_SIZE: usize = 65464;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_RETRANSMITS: u32 = 5;
const MAX_PACKET: usize = 65536;

/// Bind the server described by `config` and run it in the background.
///
/// The listen address is resolved against `vars` here, before the session
/// starts, so later variable changes do not affect it.
pub async fn spawn(config: &TftpConfig, vars: &Vars) -> Result<JoinHandle<()>> {
    let (ip, port) = config.listen_addr(vars)?;
    let mounts = MountTable::new(&config.mounts);
    if mounts.is_empty() {
        tracing::warn!("TFTP server has no mounts; every request will fail");
    }
    let server = BootServer::bind(&ip, port, mounts).await?;
    Ok(tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("TFTP server stopped: {:#}", e);
        }
    }))
}

pub struct BootServer {
    socket: UdpSocket,
    mounts: Arc<MountTable>,
}

impl BootServer {
    pub async fn bind(ip: &str, port: u16, mounts: MountTable) -> Result<Self> {
        let socket = UdpSocket::bind((ip, port))
            .await
            .with_context(|| format!("Failed to bind TFTP server to {}:{}", ip, port))?;
        tracing::info!("TFTP server listening on {}", socket.local_addr()?);
        Ok(BootServer {
            socket,
            mounts: Arc::new(mounts),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve requests until the listening socket fails.
    pub async fn run(self) -> Result<()> {
        let local_ip = self.socket.local_addr()?.ip();
        let mut buf = vec![0u8; MAX_PACKET];
        loop {
            let (n, peer) = self
                .socket
                .recv_from(&mut buf)
                .await
                .context("TFTP receive failed")?;
            match Packet::parse(&buf[..n]) {
                Ok(Packet::Rrq {
                    filename,
                    mode,
                    options,
                }) => {
                    tracing::info!("TFTP {} requested {} ({})", peer, filename, mode);
                    let mounts = Arc::clone(&self.mounts);
                    tokio::spawn(async move {
                        let request = ReadRequest {
                            peer,
                            filename,
                            options,
                        };
                        if let Err(e) = request.serve(local_ip, &mounts).await {
                            tracing::warn!("TFTP transfer to {} failed: {:#}", peer, e);
                        }
                    });
                }
                Ok(Packet::Wrq { filename, .. }) => {
                    tracing::info!("TFTP {} tried to write {}", peer, filename);
                    self.reply(peer, Packet::error(ERR_ACCESS_VIOLATION, "Server is read-only"))
                        .await;
                }
                Ok(other) => {
                    tracing::debug!("TFTP unexpected packet from {}: {:?}", peer, other);
                    self.reply(peer, Packet::error(ERR_ILLEGAL_OPERATION, "Illegal TFTP operation"))
                        .await;
                }
                Err(e) => {
                    tracing::debug!("TFTP malformed packet from {}: {}", peer, e);
                    self.reply(peer, Packet::error(ERR_ILLEGAL_OPERATION, e.to_string()))
                        .await;
                }
            }
        }
    }

    async fn reply(&self, peer: SocketAddr, packet: Packet) {
        if let Err(e) = self.socket.send_to(&packet.encode(), peer).await {
            tracing::debug!("TFTP reply to {} failed: {}", peer, e);
        }
    }
}

/// Transfer parameters after option negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Transfer {
    block_size: usize,
    timeout: Duration,
    /// Options to acknowledge with an OACK; empty means plain RFC 1350.
    accepted: packet::Options,
}

impl Transfer {
    fn negotiate(requested: &packet::Options, file_len: u64) -> Self {
        let mut transfer = Transfer {
            block_size: DEFAULT_BLOCK_SIZE,
            timeout: DEFAULT_TIMEOUT,
            accepted: Vec::new(),
        };
        for (name, value) in requested {
            let name = name.to_ascii_lowercase();
            match name.as_str() {
                "blksize" => {
                    if let Ok(size) = value.parse::<usize>() {
                        if size >= MIN_BLOCK_SIZE {
                            transfer.block_size = size.min(MAX_BLOCK_SIZE);
                            transfer.accepted.push((name, transfer.block_size.to_string()));
                        }
                    }
                }
                "timeout" => {
                    if let Ok(secs @ 1..=255) = value.parse::<u64>() {
                        transfer.timeout = Duration::from_secs(secs);
                        transfer.accepted.push((name, secs.to_string()));
                    }
                }
                "tsize" => transfer.accepted.push((name, file_len.to_string())),
                _ => tracing::debug!("TFTP ignoring option {}={}", name, value),
            }
        }
        transfer
    }
}

struct ReadRequest {
    peer: SocketAddr,
    filename: String,
    options: packet::Options,
}

impl ReadRequest {
    async fn serve(self, local_ip: IpAddr, mounts: &MountTable) -> Result<()> {
        let socket = UdpSocket::bind((local_ip, 0))
            .await
            .context("Failed to bind transfer socket")?;
        socket.connect(self.peer).await?;

        let Some(path) = mounts.resolve(&self.filename) else {
            tracing::info!("TFTP {} not found", self.filename);
            socket
                .send(&Packet::error(ERR_NOT_FOUND, "File not found").encode())
                .await?;
            return Ok(());
        };
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) => {
                socket
                    .send(&Packet::error(ERR_UNDEFINED, e.to_string()).encode())
                    .await?;
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let transfer = Transfer::negotiate(&self.options, content.len() as u64);
        if !transfer.accepted.is_empty() {
            let oack = Packet::Oack {
                options: transfer.accepted.clone(),
            };
            send_until_acked(&socket, &oack.encode(), 0, transfer.timeout).await?;
        }

        let mut block: u16 = 1;
        let mut offset = 0;
        loop {
            let end = (offset + transfer.block_size).min(content.len());
            let data = Packet::Data {
                block,
                data: content[offset..end].to_vec(),
            };
            send_until_acked(&socket, &data.encode(), block, transfer.timeout).await?;
            if end - offset < transfer.block_size {
                break;
            }
            offset = end;
            block = block.wrapping_add(1);
        }
        tracing::info!("TFTP sent {} ({} bytes) to {}", path.display(), content.len(), self.peer);
        Ok(())
    }
}

/// Send `packet` and wait for the ACK of `block`, retransmitting on timeout.
async fn send_until_acked(socket: &UdpSocket, packet: &[u8], block: u16, wait: Duration) -> Result<()> {
    let mut buf = vec![0u8; MAX_PACKET];
    for attempt in 0..=MAX_RETRANSMITS {
        if attempt > 0 {
            tracing::debug!("TFTP retransmitting block {} (attempt {})", block, attempt);
        }
        socket.send(packet).await?;
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Ok(received) = timeout(remaining, socket.recv(&mut buf)).await else {
                break;
            };
            let n = received?;
            match Packet::parse(&buf[..n]) {
                Ok(Packet::Ack { block: acked }) if acked == block => return Ok(()),
                Ok(Packet::Error { code, message }) => {
                    bail!("Peer aborted transfer: {} {}", code, message)
                }
                // Duplicate ACKs and noise are ignored.
                _ => {}
            }
        }
    }
    bail!("No ACK for block {} after {} retransmits", block, MAX_RETRANSMITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start(mounts: MountTable) -> SocketAddr {
        let server = BootServer::bind("127.0.0.1", 0, mounts).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn recv(client: &UdpSocket) -> (Packet, SocketAddr) {
        let mut buf = vec![0u8; MAX_PACKET];
        let (n, from) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        (Packet::parse(&buf[..n]).unwrap(), from)
    }

    fn rrq(filename: &str, options: &[(&str, &str)]) -> Vec<u8> {
        Packet::Rrq {
            filename: filename.into(),
            mode: "octet".into(),
            options: options
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        }
        .encode()
    }

    #[test]
    fn test_negotiate_options() {
        let requested = vec![
            ("BLKSIZE".to_string(), "1468".to_string()),
            ("tsize".to_string(), "0".to_string()),
            ("timeout".to_string(), "0".to_string()),
            ("windowsize".to_string(), "4".to_string()),
        ];
        let t = Transfer::negotiate(&requested, 1234);
        assert_eq!(t.block_size, 1468);
        assert_eq!(t.timeout, DEFAULT_TIMEOUT);
        assert_eq!(
            t.accepted,
            vec![
                ("blksize".to_string(), "1468".to_string()),
                ("tsize".to_string(), "1234".to_string())
            ]
        );

        let t = Transfer::negotiate(&vec![("blksize".into(), "100000".into())], 0);
        assert_eq!(t.block_size, MAX_BLOCK_SIZE);
        let t = Transfer::negotiate(&vec![("blksize".into(), "4".into())], 0);
        assert_eq!(t.block_size, DEFAULT_BLOCK_SIZE);
        assert!(t.accepted.is_empty());
    }

    #[tokio::test]
    async fn test_serves_file_in_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..1300u32).map(|i| i as u8).collect();
        std::fs::write(dir.path().join("Image"), &content).unwrap();
        let mut mounts = MountTable::default();
        mounts.push(dir.path(), "/boot");
        let server = start(mounts).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&rrq("/boot/Image", &[]), server).await.unwrap();

        let mut received = Vec::new();
        let mut expected_block = 1;
        loop {
            let (packet, from) = recv(&client).await;
            let Packet::Data { block, data } = packet else {
                panic!("expected DATA, got {:?}", packet);
            };
            assert_eq!(block, expected_block);
            assert_ne!(from, server, "transfer must use its own socket");
            received.extend_from_slice(&data);
            client
                .send_to(&Packet::Ack { block }.encode(), from)
                .await
                .unwrap();
            if data.len() < DEFAULT_BLOCK_SIZE {
                break;
            }
            expected_block += 1;
        }
        assert_eq!(expected_block, 3);
        assert_eq!(received, content);
    }

    #[tokio::test]
    async fn test_oack_precedes_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dtb"), b"0123456789").unwrap();
        let mut mounts = MountTable::default();
        mounts.push(dir.path(), "/");
        let server = start(mounts).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(&rrq("dtb", &[("blksize", "8"), ("tsize", "0")]), server)
            .await
            .unwrap();

        let (packet, from) = recv(&client).await;
        assert_eq!(
            packet,
            Packet::Oack {
                options: vec![
                    ("blksize".into(), "8".into()),
                    ("tsize".into(), "10".into())
                ]
            }
        );
        client.send_to(&Packet::Ack { block: 0 }.encode(), from).await.unwrap();

        let (packet, _) = recv(&client).await;
        assert_eq!(
            packet,
            Packet::Data {
                block: 1,
                data: b"01234567".to_vec()
            }
        );
        client.send_to(&Packet::Ack { block: 1 }.encode(), from).await.unwrap();
        let (packet, _) = recv(&client).await;
        assert_eq!(
            packet,
            Packet::Data {
                block: 2,
                data: b"89".to_vec()
            }
        );
        client.send_to(&Packet::Ack { block: 2 }.encode(), from).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_and_write_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut mounts = MountTable::default();
        mounts.push(dir.path(), "/");
        let server = start(mounts).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&rrq("absent", &[]), server).await.unwrap();
        let (packet, _) = recv(&client).await;
        assert!(matches!(packet, Packet::Error { code: ERR_NOT_FOUND, .. }));

        let wrq = Packet::Wrq {
            filename: "upload".into(),
            mode: "octet".into(),
            options: Vec::new(),
        };
        client.send_to(&wrq.encode(), server).await.unwrap();
        let (packet, from) = recv(&client).await;
        assert!(matches!(packet, Packet::Error { code: ERR_ACCESS_VIOLATION, .. }));
        assert_eq!(from, server);
    }

    #[tokio::test]
    async fn test_retransmits_unacked_block() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"abc").unwrap();
        let mut mounts = MountTable::default();
        mounts.push(dir.path(), "/");
        let server = start(mounts).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&rrq("f", &[]), server).await.unwrap();
        let (first, from) = recv(&client).await;
        // No ACK: the same block comes again after the timeout.
        let (second, again) = recv(&client).await;
        assert_eq!(first, second);
        assert_eq!(from, again);
        client.send_to(&Packet::Ack { block: 1 }.encode(), from).await.unwrap();
    }
}
