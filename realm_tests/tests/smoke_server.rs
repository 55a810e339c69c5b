use std::time::{Duration, Instant};

use realm_server::Server;
use realm_tests::{ephemeral_config, start_server};

/// Smoke test: server can run a few ticks without panicking.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let mut scheduler = start_server(ephemeral_config()).await?;
    scheduler.run_for_ticks(3).await;
    assert_eq!(scheduler.server().current_tick(), 3);
    assert_eq!(scheduler.server().worlds().default_world().unwrap().time(), 3);
    scheduler.server_mut().shutdown();
    Ok(())
}

/// Ticks are paced at the nominal period rather than run back to back.
#[tokio::test]
async fn ticks_are_paced() -> anyhow::Result<()> {
    let mut scheduler = start_server(ephemeral_config()).await?;
    let started = Instant::now();
    scheduler.run_for_ticks(6).await;
    assert!(started.elapsed() >= Duration::from_millis(240));
    scheduler.server_mut().shutdown();
    Ok(())
}

/// Work submitted from another thread runs on the tick loop.
#[tokio::test]
async fn tasks_from_other_threads_are_applied() -> anyhow::Result<()> {
    let mut scheduler = start_server(ephemeral_config()).await?;
    let sender = scheduler.sender();
    std::thread::spawn(move || {
        sender.submit(|server: &mut Server| {
            server.load_or_create_world("from-thread");
        });
    })
    .join()
    .expect("submitter thread");

    scheduler.run_for_ticks(1).await;
    assert!(scheduler.server().worlds().contains("from-thread"));
    scheduler.server_mut().shutdown();
    Ok(())
}

/// A second shutdown after the listener has been closed is a no-op.
#[tokio::test]
async fn repeated_shutdown_with_bound_transport() -> anyhow::Result<()> {
    let mut scheduler = start_server(ephemeral_config()).await?;
    let addr = scheduler.server().local_addr().expect("transport bound");

    scheduler.server_mut().shutdown();
    scheduler.server_mut().shutdown();

    assert!(!scheduler.server().is_running());
    assert!(scheduler.server().local_addr().is_none());
    assert!(scheduler.server().worlds().is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    Ok(())
}
