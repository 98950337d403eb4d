use clap::{Parser, Subcommand};
use client::game::Notification;
use client::input::{parse_command, Command, HELP};
use client::launcher::{LaunchedParticipant, LocalLauncher};
use client::network::{Client, ClientHandle};
use client::relay::{InMemoryRelayService, RelayConnector};
use client::rendering::Renderer;
use client::session::config::SessionConfig;
use client::session::memory::{InMemoryAuth, InMemoryLobbyService};
use client::session::{LobbyManager, SessionContext, SessionEvent, SessionState};
use log::{info, warn};
use shared::GameEvent;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

type MainError = Box<dyn std::error::Error + Send + Sync>;

/// How long the local demo waits for a lobby step before giving up.
const LOBBY_STEP_TIMEOUT: Duration = Duration::from_secs(10);
const LOBBY_TICK: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Join a running authority server directly
    Connect {
        /// Server address to connect to
        #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
        server: SocketAddr,
    },
    /// Run lobby, relay handoff and game in one process, two players at one terminal
    Local {
        /// Port the hosted authority listens on
        #[arg(short, long, default_value = "7777")]
        port: u16,

        /// Tick rate of the hosted authority (state resyncs per second)
        #[arg(short, long, default_value = "30")]
        tick_rate: u32,

        /// Game mode advertised in the lobby
        #[arg(short, long, default_value = "Classic")]
        game_mode: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    match args.mode {
        Mode::Connect { server } => play_connected(server).await,
        Mode::Local {
            port,
            tick_rate,
            game_mode,
        } => play_local(port, tick_rate, &game_mode).await,
    }
}

async fn play_connected(server: SocketAddr) -> Result<(), MainError> {
    info!("Connecting to: {}", server);

    let (client, mut handle) = Client::new(server).await?;
    let client_task = tokio::spawn(client.run());
    let renderer = Renderer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Command::Move { x, y }) => {
                        if !handle.view().is_my_turn() {
                            println!("Not your turn");
                        }
                        handle.attempt_move(x, y);
                    }
                    Ok(Command::Rematch) => {
                        handle.request_rematch();
                    }
                    Ok(Command::Board) => println!("{}", renderer.render(&handle.view())),
                    Ok(Command::Help) => println!("{}", HELP),
                    Ok(Command::Quit) => break,
                    Err(e) => println!("{}", e),
                }
            },

            notification = handle.next_notification() => {
                let Some(notification) = notification else { break };
                if !show(&renderer, &handle, &notification) {
                    break;
                }
            },
        }
    }

    handle.disconnect();
    if let Ok(Err(e)) = client_task.await {
        warn!("Client stopped with error: {}", e);
    }

    Ok(())
}

/// Prints a notification. Returns false once the connection is gone.
fn show(renderer: &Renderer, handle: &ClientHandle, notification: &Notification) -> bool {
    if let Some(text) = renderer.describe(notification) {
        println!("{}", text);
    }

    match notification {
        Notification::Game(GameEvent::PiecePlaced { .. })
        | Notification::Game(GameEvent::GameStarted)
        | Notification::Game(GameEvent::Rematch)
        | Notification::ScoresChanged { .. } => {
            println!("{}", renderer.render(&handle.view()));
            true
        }
        Notification::Disconnected { .. } => false,
        _ => true,
    }
}

/// Lobby with one host and one guest, both in this process.
async fn play_local(port: u16, tick_rate: u32, game_mode: &str) -> Result<(), MainError> {
    let endpoint = SocketAddr::from(([127, 0, 0, 1], port));
    let tick_duration = Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64);

    let lobby_service = Arc::new(InMemoryLobbyService::new());
    let auth = Arc::new(InMemoryAuth::new());
    let relay_service = Arc::new(InMemoryRelayService::new(endpoint));
    let config = SessionConfig {
        game_mode: game_mode.to_string(),
        ..SessionConfig::default()
    };

    let session = |launcher: Arc<LocalLauncher>| {
        let context = SessionContext {
            lobby: lobby_service.clone(),
            auth: auth.clone(),
            relay: RelayConnector::new(relay_service.clone(), launcher),
        };
        LobbyManager::new(context, config.clone())
    };

    let (host_launcher, mut host_started) = LocalLauncher::new(tick_duration);
    let (guest_launcher, mut guest_started) = LocalLauncher::new(tick_duration);
    let (mut host, mut host_events) = session(Arc::new(host_launcher))?;
    let (mut guest, mut guest_events) = session(Arc::new(guest_launcher))?;

    if !host.sign_in().await || !guest.sign_in().await {
        return Err("sign-in failed".into());
    }

    if !host
        .create_lobby("Local Lobby", config.max_players, &config.game_mode)
        .await
    {
        return Err("could not create lobby".into());
    }

    let open = guest.list_lobbies().await;
    let code = host
        .joined_lobby()
        .map(|lobby| lobby.lobby_code.clone())
        .ok_or("host has no lobby")?;
    info!("{} open lobby(ies); joining {}", open.len(), code);
    if !guest.join_by_code(&code).await {
        return Err("could not join lobby".into());
    }

    let deadline = Instant::now() + LOBBY_STEP_TIMEOUT;
    let mut ticker = tokio::time::interval(LOBBY_TICK);
    let mut ready = false;
    while !ready {
        ticker.tick().await;
        if Instant::now() > deadline {
            return Err("lobby never became ready".into());
        }
        let now = Instant::now();
        host.update(now).await;
        guest.update(now).await;
        ready = log_session_events(&mut host_events, &mut guest_events);
    }

    host.log_players();
    if !host.start_game().await {
        return Err("could not start game".into());
    }

    let deadline = Instant::now() + LOBBY_STEP_TIMEOUT;
    while host.state() != SessionState::Detached || guest.state() != SessionState::Detached {
        ticker.tick().await;
        if Instant::now() > deadline {
            return Err("relay handoff did not complete".into());
        }
        let now = Instant::now();
        host.update(now).await;
        guest.update(now).await;
        log_session_events(&mut host_events, &mut guest_events);
    }

    let host_player = host_started.recv().await.ok_or("host did not start")?;
    let guest_player = guest_started.recv().await.ok_or("guest did not start")?;

    hot_seat(host_player, guest_player).await
}

/// Logs pending session events. Returns true if the lobby became ready.
fn log_session_events(
    host_events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    guest_events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> bool {
    let mut ready = false;
    for (who, events) in [("host", host_events), ("guest", guest_events)] {
        while let Ok(event) = events.try_recv() {
            info!("[{}] {:?}", who, event);
            ready |= matches!(event, SessionEvent::ReadyToStart { .. });
        }
    }
    ready
}

/// Both participants share the terminal; each move goes to whoever's turn it is.
async fn hot_seat(host: LaunchedParticipant, guest: LaunchedParticipant) -> Result<(), MainError> {
    let mut host = host.handle;
    let mut guest = guest.handle;
    let renderer = Renderer::new("host");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Command::Move { x, y }) => {
                        let turn = host.current_turn();
                        if turn.is_none() {
                            println!("No one may move right now; try 'rematch'");
                        } else if turn == host.local_mark() {
                            host.attempt_move(x, y);
                        } else {
                            guest.attempt_move(x, y);
                        }
                    }
                    Ok(Command::Rematch) => {
                        host.request_rematch();
                    }
                    Ok(Command::Board) => println!("{}", renderer.render(&host.view())),
                    Ok(Command::Help) => println!("{}", HELP),
                    Ok(Command::Quit) => break,
                    Err(e) => println!("{}", e),
                }
            },

            notification = host.next_notification() => {
                let Some(notification) = notification else { break };
                if !show(&renderer, &host, &notification) {
                    break;
                }
            },

            notification = guest.next_notification() => match notification {
                Some(Notification::Disconnected { reason }) => {
                    println!("Guest disconnected: {}", reason);
                    break;
                }
                None => break,
                Some(_) => {}
            },
        }
    }

    guest.disconnect();
    host.disconnect();
    Ok(())
}
