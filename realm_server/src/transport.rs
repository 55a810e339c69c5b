//! TCP transport.
//!
//! Runs on the async runtime, never on the simulation context. Every
//! connection gets a reader task and a writer loop; anything that changes
//! server state is submitted as a task.

use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use realm_shared::{
    config::GameMode,
    math::{Location, Vec3},
    net::{Packet, PacketReader, PacketWriter, PROTOCOL_VERSION},
};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    player::{Connection, Profile, Session},
    server::Server,
    task::TaskSender,
};

/// How long a fresh connection may take to send its login packet.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_NAME_LEN: usize = 16;

/// Listening socket plus the tasks serving it.
#[derive(Debug)]
pub struct Transport {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept: JoinHandle<()>,
}

impl Transport {
    /// Binds `addr` and starts accepting connections.
    pub async fn bind(addr: &str, tasks: TaskSender<Server>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        let local_addr = listener.local_addr().context("local addr")?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept = tokio::spawn(accept_loop(listener, tasks, shutdown_rx));
        info!(%local_addr, "Transport listening");
        Ok(Self {
            local_addr,
            shutdown,
            accept,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and ends every connection's writer loop.
    pub fn close(self) {
        let _ = self.shutdown.send(true);
        self.accept.abort();
        info!(local_addr = %self.local_addr, "Transport closed");
    }
}

async fn accept_loop(
    listener: TcpListener,
    tasks: TaskSender<Server>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Connection accepted");
                    tokio::spawn(serve(stream, peer, tasks.clone(), shutdown.clone()));
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    tasks: TaskSender<Server>,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = handle_connection(stream, peer, tasks, shutdown).await {
        debug!(%peer, error = %format!("{e:#}"), "Connection ended with error");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tasks: TaskSender<Server>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (read, write) = stream.into_split();
    let mut reader = PacketReader::new(read);
    let mut writer = PacketWriter::new(write);

    let login = tokio::time::timeout(LOGIN_TIMEOUT, reader.recv())
        .await
        .context("login timed out")??;
    let profile = match validate_login(login) {
        Ok(profile) => profile,
        Err(e) => {
            writer
                .send(&Packet::Disconnect {
                    reason: e.to_string(),
                })
                .await?;
            writer.shutdown().await.ok();
            return Err(e);
        }
    };

    let (connection, mut outbound) = Connection::channel();
    // The server places the session in its default world when the join runs.
    let session = Session::new(
        peer,
        profile,
        Location::new("", Vec3::ZERO),
        GameMode::Survival,
        connection,
    );
    let entity_id = session.entity_id();
    tasks.submit(move |server: &mut Server| server.join(session));

    let mut inbound = tokio::spawn(read_loop(reader, peer, tasks.clone()));
    let result = write_loop(&mut writer, &mut outbound, &mut inbound, &mut shutdown).await;

    inbound.abort();
    tasks.submit(move |server: &mut Server| {
        server.remove_session(peer, entity_id);
    });
    result
}

/// Forwards queued packets until the session is dropped, the peer goes away
/// or the transport closes. A disconnect packet is the last one written.
async fn write_loop(
    writer: &mut PacketWriter<OwnedWriteHalf>,
    outbound: &mut mpsc::UnboundedReceiver<Packet>,
    inbound: &mut JoinHandle<()>,
    shutdown: &mut watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            biased;
            packet = outbound.recv() => {
                let Some(packet) = packet else {
                    return Ok(());
                };
                if write_packet(writer, &packet).await? {
                    return Ok(());
                }
            }
            _ = &mut *inbound => return Ok(()),
            _ = shutdown.changed() => return flush_queued(writer, outbound).await,
        }
    }
}

/// Writes whatever the session already queued, stopping after a disconnect.
async fn flush_queued(
    writer: &mut PacketWriter<OwnedWriteHalf>,
    outbound: &mut mpsc::UnboundedReceiver<Packet>,
) -> anyhow::Result<()> {
    while let Ok(packet) = outbound.try_recv() {
        if write_packet(writer, &packet).await? {
            return Ok(());
        }
    }
    Ok(())
}

/// Sends one packet; returns true once the stream has been closed behind a
/// disconnect.
async fn write_packet(
    writer: &mut PacketWriter<OwnedWriteHalf>,
    packet: &Packet,
) -> anyhow::Result<bool> {
    writer.send(packet).await?;
    if matches!(packet, Packet::Disconnect { .. }) {
        writer.shutdown().await.ok();
        return Ok(true);
    }
    Ok(false)
}

fn validate_login(packet: Packet) -> anyhow::Result<Profile> {
    let Packet::Login {
        protocol,
        name,
        identity,
        xuid,
        device,
        skin,
    } = packet
    else {
        bail!("Expected login");
    };
    if protocol != PROTOCOL_VERSION {
        bail!("Incompatible protocol {protocol}, server speaks {PROTOCOL_VERSION}");
    }
    let name = name.trim().to_string();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        bail!("Invalid player name");
    }
    Ok(Profile {
        identity,
        name,
        xuid,
        device,
        skin,
    })
}

async fn read_loop(
    mut reader: PacketReader<OwnedReadHalf>,
    peer: SocketAddr,
    tasks: TaskSender<Server>,
) {
    loop {
        match reader.recv().await {
            Ok(Packet::Text { message }) => {
                tasks.submit(move |server: &mut Server| server.handle_chat(peer, &message));
            }
            Ok(other) => debug!(%peer, packet = ?other, "Ignoring packet"),
            Err(e) => {
                debug!(%peer, error = %format!("{e:#}"), "Connection closed by peer");
                break;
            }
        }
    }
}
