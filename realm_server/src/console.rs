//! Operator console.
//!
//! A background thread reads stdin line by line and submits each line as a
//! task; commands therefore always execute on the simulation context.

use std::{
    io::{BufRead, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::{debug, info};

use crate::{
    server::{Server, UnloadOutcome},
    task::TaskSender,
    world::LoadOutcome,
};

/// Handle to the stdin reader thread.
#[derive(Debug)]
pub struct ConsoleInput {
    stopped: Arc<AtomicBool>,
}

impl ConsoleInput {
    pub fn spawn(tasks: TaskSender<Server>) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            loop {
                print!("> ");
                let _ = stdout.flush();
                let mut line = String::new();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                tasks.submit(move |server: &mut Server| {
                    for out in execute(server, &line) {
                        println!("{out}");
                    }
                });
            }
            debug!("Console reader exited");
        });
        Self { stopped }
    }

    /// Stops forwarding lines. The reader thread exits after its current read.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        info!("Console input stopped");
    }
}

/// Executes one console command and returns the lines to print.
pub fn execute(server: &mut Server, line: &str) -> Vec<String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = tokens.split_first() else {
        return Vec::new();
    };

    match command.to_lowercase().as_str() {
        "stop" | "quit" => {
            server.shutdown();
            vec!["Server stopped".to_string()]
        }
        "status" => {
            let mut out = vec![
                format!("Tick: {}", server.current_tick()),
                format!("TPS: {:.2}", server.current_tps()),
                format!(
                    "Players: {}/{}",
                    server.players().len(),
                    server.config().max_players
                ),
            ];
            for world in server.worlds().iter() {
                let marker = if server.worlds().is_default(world.name()) {
                    " (default)"
                } else {
                    ""
                };
                out.push(format!(
                    "  {}{}: time={} chunks={} players={}",
                    world.name(),
                    marker,
                    world.time(),
                    world.chunk_count(),
                    server.players().in_world(world.name()).len()
                ));
            }
            out
        }
        "tps" => vec![format!("TPS: {:.2}", server.current_tps())],
        "list" => {
            let mut names: Vec<&str> = server.players().iter().map(|s| s.name()).collect();
            names.sort_unstable();
            vec![format!(
                "{} player(s) online: {}",
                names.len(),
                names.join(", ")
            )]
        }
        "say" => {
            if args.is_empty() {
                return vec!["Usage: say <message>".to_string()];
            }
            server.broadcast_message(&format!("[Server] {}", args.join(" ")));
            Vec::new()
        }
        "load" => {
            let Some(name) = args.first() else {
                return vec!["Usage: load <world>".to_string()];
            };
            let line = match server.load_or_create_world(name) {
                LoadOutcome::Loaded => format!("World '{name}' loaded"),
                LoadOutcome::AlreadyLoaded => format!("World '{name}' is already loaded"),
                LoadOutcome::Failed => format!("Failed to load world '{name}'"),
            };
            vec![line]
        }
        "unload" => {
            let Some(name) = args.first() else {
                return vec!["Usage: unload <world>".to_string()];
            };
            let line = match server.unload_world(name) {
                UnloadOutcome::Unloaded => format!("World '{name}' unloaded"),
                UnloadOutcome::Cancelled => format!("Unloading '{name}' was cancelled"),
                UnloadOutcome::NotFound => format!("World '{name}' is not loaded"),
            };
            vec![line]
        }
        "help" => vec![
            "stop | quit       Shut the server down".to_string(),
            "status            Tick, TPS, players and worlds".to_string(),
            "tps               Current ticks per second".to_string(),
            "list              Online players".to_string(),
            "say <message>     Broadcast a chat message".to_string(),
            "load <world>      Load or create a world".to_string(),
            "unload <world>    Unload a world".to_string(),
        ],
        other => vec![format!("Unknown command '{other}'. Type 'help' for a list.")],
    }
}
