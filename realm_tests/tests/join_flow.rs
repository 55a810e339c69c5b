//! Socket-level tests: login, roster broadcasts, chat and shutdown.

use realm_server::Server;
use realm_shared::config::ServerConfig;
use realm_shared::net::{Packet, PlayStatus, PROTOCOL_VERSION};
use realm_tests::{ephemeral_config, init_tracing, start_server, TestClient};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_players_see_each_other_until_shutdown() -> anyhow::Result<()> {
    init_tracing();

    let mut scheduler = start_server(ephemeral_config()).await?;
    let addr = scheduler.server().local_addr().expect("transport bound");
    let tasks = scheduler.sender();
    let server_handle = tokio::spawn(async move {
        scheduler.run().await;
        scheduler
    });

    let mut alice = TestClient::connect(addr, "Alice").await?;
    let joined = alice.expect_join().await?;
    assert!(matches!(
        joined[0],
        Packet::PlayStatus {
            status: PlayStatus::LoginSuccess
        }
    ));
    assert!(matches!(joined[1], Packet::ResourcePacksInfo { forced: false, .. }));
    match &joined[2] {
        Packet::StartGame { spawn, .. } => assert_eq!(spawn.world, "world"),
        other => panic!("expected StartGame, got {other:?}"),
    }

    let mut bob = TestClient::connect(addr, "Bob").await?;
    let joined = bob.expect_join().await?;
    assert!(joined.iter().any(|p| matches!(p, Packet::PlayerListAdd { entries }
        if entries.iter().any(|e| e.identity == alice.identity))));

    let announced = alice.recv().await?;
    assert!(matches!(&announced, Packet::PlayerListAdd { entries }
        if entries.len() == 1 && entries[0].name == "Bob"));

    bob.say("hello").await?;
    assert_eq!(
        alice.recv().await?,
        Packet::Text {
            message: "<Bob> hello".into()
        }
    );

    let bob_identity = bob.identity;
    drop(bob);
    let removed = alice
        .recv_until(|p| matches!(p, Packet::PlayerListRemove { .. }))
        .await?;
    assert_eq!(
        removed,
        Packet::PlayerListRemove {
            identities: vec![bob_identity]
        }
    );

    tasks.submit(|server: &mut Server| server.shutdown());
    let goodbye = alice
        .recv_until(|p| matches!(p, Packet::Disconnect { .. }))
        .await?;
    assert_eq!(
        goodbye,
        Packet::Disconnect {
            reason: "Server shutdown".into()
        }
    );

    let scheduler = server_handle.await?;
    assert!(!scheduler.server().is_running());
    assert!(scheduler.server().players().is_empty());
    assert!(scheduler.server().worlds().is_empty());
    assert!(scheduler.server().local_addr().is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_server_turns_players_away() -> anyhow::Result<()> {
    init_tracing();

    let mut scheduler = start_server(ServerConfig {
        max_players: 1,
        ..ephemeral_config()
    })
    .await?;
    let addr = scheduler.server().local_addr().expect("transport bound");
    let tasks = scheduler.sender();
    let server_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    let mut first = TestClient::connect(addr, "First").await?;
    first.expect_join().await?;

    let mut second = TestClient::connect(addr, "Second").await?;
    assert_eq!(
        second.recv().await?,
        Packet::PlayStatus {
            status: PlayStatus::ServerFull
        }
    );
    assert_eq!(
        second.recv().await?,
        Packet::Disconnect {
            reason: "Server is full".into()
        }
    );

    tasks.submit(|server: &mut Server| server.shutdown());
    server_handle.await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn incompatible_protocol_is_rejected() -> anyhow::Result<()> {
    init_tracing();

    let mut scheduler = start_server(ephemeral_config()).await?;
    let addr = scheduler.server().local_addr().expect("transport bound");
    let tasks = scheduler.sender();
    let server_handle = tokio::spawn(async move {
        scheduler.run().await;
        scheduler
    });

    let mut client = TestClient::connect_with_protocol(addr, "Old", PROTOCOL_VERSION + 7).await?;
    match client.recv().await? {
        Packet::Disconnect { reason } => assert!(reason.contains("Incompatible protocol")),
        other => panic!("expected Disconnect, got {other:?}"),
    }

    tasks.submit(|server: &mut Server| server.shutdown());
    let scheduler = server_handle.await?;
    assert!(scheduler.server().players().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_reason_always_reaches_connected_players() -> anyhow::Result<()> {
    init_tracing();

    for round in 0..20 {
        let mut scheduler = start_server(ephemeral_config()).await?;
        let addr = scheduler.server().local_addr().expect("transport bound");
        let tasks = scheduler.sender();
        let server_handle = tokio::spawn(async move {
            scheduler.run().await;
        });

        let mut client = TestClient::connect(addr, &format!("Round{round}")).await?;
        client.expect_join().await?;

        tasks.submit(|server: &mut Server| server.shutdown());
        let goodbye = client
            .recv_until(|p| matches!(p, Packet::Disconnect { .. }))
            .await?;
        assert_eq!(
            goodbye,
            Packet::Disconnect {
                reason: "Server shutdown".into()
            },
            "round {round}"
        );
        server_handle.await?;
    }
    Ok(())
}
