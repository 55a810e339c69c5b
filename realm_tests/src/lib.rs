//! Helpers shared by the integration tests: a minimal TCP client and a
//! launcher preset that binds an ephemeral port with in-memory worlds.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use realm_server::{world::StorageProvider, Launcher, TickScheduler};
use realm_shared::{
    config::ServerConfig,
    net::{DeviceInfo, Packet, PacketReader, PacketWriter, Skin, PROTOCOL_VERSION},
};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};
use uuid::Uuid;

/// Upper bound on waiting for any single packet.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Fresh, not yet existing directory under the system temp dir.
pub fn temp_root(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("realm-{tag}-{}", Uuid::new_v4()))
}

/// Configuration bound to 127.0.0.1 on an ephemeral port.
pub fn ephemeral_config() -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// Starts a server with `config` and in-memory world storage.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<TickScheduler> {
    Launcher::new(temp_root("server"))
        .config(config)
        .storage(StorageProvider::Memory)
        .start()
        .await
}

/// Speaks the wire protocol like a real client would.
pub struct TestClient {
    pub identity: Uuid,
    pub name: String,
    reader: PacketReader<OwnedReadHalf>,
    writer: PacketWriter<OwnedWriteHalf>,
}

impl TestClient {
    /// Connects and sends a login with the current protocol version.
    pub async fn connect(addr: SocketAddr, name: &str) -> anyhow::Result<Self> {
        Self::connect_with_protocol(addr, name, PROTOCOL_VERSION).await
    }

    pub async fn connect_with_protocol(
        addr: SocketAddr,
        name: &str,
        protocol: u32,
    ) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect {addr}"))?;
        let (read, write) = stream.into_split();
        let mut client = Self {
            identity: Uuid::new_v4(),
            name: name.to_string(),
            reader: PacketReader::new(read),
            writer: PacketWriter::new(write),
        };
        let login = Packet::Login {
            protocol,
            name: client.name.clone(),
            identity: client.identity,
            xuid: format!("xuid-{name}"),
            device: DeviceInfo {
                device_name: "test-harness".into(),
                os: std::env::consts::OS.into(),
            },
            skin: Skin::default(),
        };
        client.send(&login).await?;
        Ok(client)
    }

    pub async fn send(&mut self, packet: &Packet) -> anyhow::Result<()> {
        self.writer.send(packet).await
    }

    pub async fn say(&mut self, message: &str) -> anyhow::Result<()> {
        self.send(&Packet::Text {
            message: message.to_string(),
        })
        .await
    }

    pub async fn recv(&mut self) -> anyhow::Result<Packet> {
        tokio::time::timeout(RECV_TIMEOUT, self.reader.recv())
            .await
            .context("timed out waiting for a packet")?
    }

    /// Reads packets until one matches, discarding the rest.
    pub async fn recv_until<F>(&mut self, mut pred: F) -> anyhow::Result<Packet>
    where
        F: FnMut(&Packet) -> bool,
    {
        loop {
            let packet = self.recv().await?;
            if pred(&packet) {
                return Ok(packet);
            }
        }
    }

    /// Reads packets up to and including this client's own tablist entry.
    pub async fn expect_join(&mut self) -> anyhow::Result<Vec<Packet>> {
        let mut packets = Vec::new();
        loop {
            let packet = self.recv().await?;
            let done = matches!(&packet, Packet::PlayerListAdd { entries }
                if entries.len() == 1 && entries[0].identity == self.identity);
            packets.push(packet);
            if done {
                return Ok(packets);
            }
        }
    }
}
