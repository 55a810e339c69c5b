//! Networking primitives.
//!
//! Goals:
//! - Provide the packet types exchanged between sessions and the server.
//! - Provide length-prefixed framing over any async byte stream.
//! - Keep serialization explicit and versionable.
//!
//! This is not a reliable-datagram protocol implementation; connection
//! reliability is delegated to TCP.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::{config::GameMode, math::Location};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single frame; larger frames are treated as a protocol error.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Client device metadata reported at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceInfo {
    pub device_name: String,
    pub os: String,
}

/// Cosmetic skin reference. Skin data itself is not carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Skin {
    pub skin_id: String,
}

/// One row of the shared "who is online" roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablistEntry {
    pub identity: Uuid,
    pub entity_id: u64,
    pub name: String,
    pub device: DeviceInfo,
    pub xuid: String,
    pub skin: Skin,
}

/// Login outcome sent right after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayStatus {
    LoginSuccess,
    ServerFull,
}

/// Resource pack advertised to joining sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePackEntry {
    pub uuid: String,
    pub version: String,
    pub size: u64,
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Packet {
    // ─── Connection handshake ───
    /// Client -> server: first frame on every connection.
    Login {
        protocol: u32,
        name: String,
        identity: Uuid,
        xuid: String,
        device: DeviceInfo,
        skin: Skin,
    },
    PlayStatus {
        status: PlayStatus,
    },
    ResourcePacksInfo {
        forced: bool,
        packs: Vec<ResourcePackEntry>,
    },
    StartGame {
        entity_id: u64,
        game_mode: GameMode,
        spawn: Location,
    },

    // ─── Roster ───
    PlayerListAdd {
        entries: Vec<TablistEntry>,
    },
    PlayerListRemove {
        identities: Vec<Uuid>,
    },

    // ─── Gameplay ───
    /// Server -> client: the session was moved.
    MovePlayer {
        location: Location,
    },
    /// Chat text in either direction.
    Text {
        message: String,
    },

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

/// Reads length-prefixed packets from an async byte stream.
#[derive(Debug)]
pub struct PacketReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub async fn recv(&mut self) -> anyhow::Result<Packet> {
        let mut len_buf = [0u8; 4];
        self.inner
            .read_exact(&mut len_buf)
            .await
            .context("read frame len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {len} bytes exceeds limit");
        }
        let mut payload = vec![0u8; len];
        self.inner
            .read_exact(&mut payload)
            .await
            .context("read frame payload")?;
        decode_from_bytes(&payload)
    }
}

/// Writes length-prefixed packets to an async byte stream.
#[derive(Debug)]
pub struct PacketWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, packet: &Packet) -> anyhow::Result<()> {
        let frame = encode_frame(packet)?;
        self.inner.write_all(&frame).await.context("write frame")?;
        Ok(())
    }

    /// Flushes and shuts down the write half.
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("shutdown writer")
    }
}

/// Encodes a packet as a single length-prefixed frame.
pub fn encode_frame(packet: &Packet) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(packet).context("serialize packet")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<Packet> {
    serde_json::from_slice(b).context("deserialize")
}
