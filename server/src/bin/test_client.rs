//! Scripted participant for smoke-testing a running server.
//!
//! Speaks the raw protocol, keeps its own board from broadcast events, and
//! plays a random open cell whenever the reconciled turn is its own. Run two
//! of them against one server to watch full games.

use bincode::{deserialize, serialize};
use clap::Parser;
use rand::seq::SliceRandom;
use shared::{
    Board, EventCursor, GameEvent, Mark, MatchState, Packet, Reconciled, BOARD_SIZE,
    CLIENT_VERSION, MAX_PACKET_SIZE,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// Games to play before disconnecting
    #[arg(short, long, default_value = "3")]
    games: u32,

    /// Pause before each move, in milliseconds
    #[arg(short, long, default_value = "250")]
    delay: u64,
}

fn open_cells(board: &Board) -> Vec<(u8, u8)> {
    (0..BOARD_SIZE)
        .flat_map(|x| (0..BOARD_SIZE).map(move |y| (x, y)))
        .filter(|&(x, y)| board.is_open(x, y))
        .collect()
}

async fn send(socket: &UdpSocket, server: SocketAddr, packet: &Packet) -> std::io::Result<()> {
    let data = serialize(packet).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    socket.send_to(&data, server).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    println!("Sending connection request to {}", args.server);
    send(
        &socket,
        args.server,
        &Packet::Connect {
            client_version: CLIENT_VERSION,
        },
    )
    .await?;

    let mut buf = [0u8; MAX_PACKET_SIZE];
    let mut heartbeat = interval(Duration::from_secs(1));
    let mut local_mark: Option<Mark> = None;
    let mut state: Reconciled<MatchState> = Reconciled::new();
    let mut events = EventCursor::new();
    let mut board = Board::new();
    let mut moved_on_version: Option<u32> = None;
    let mut games_finished = 0;

    loop {
        let packet = tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match deserialize::<Packet>(&buf[0..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        println!("Failed to deserialize packet: {}", e);
                        continue;
                    }
                }
            },
            _ = heartbeat.tick() => {
                if local_mark.is_some() {
                    send(&socket, args.server, &Packet::Heartbeat).await?;
                }
                continue;
            },
        };

        match packet {
            Packet::Connected { client_id, mark } => {
                println!("Connection accepted with client ID {}, playing {}", client_id, mark);
                local_mark = Some(mark);
            }
            Packet::Disconnected { reason } => {
                println!("Disconnected by server: {}", reason);
                return Ok(());
            }
            Packet::Event { sequence, event } => {
                if !events.accept(sequence) {
                    continue;
                }
                match event {
                    GameEvent::PiecePlaced { x, y, mark } => {
                        board.place(x, y, mark);
                    }
                    GameEvent::Rematch => board.clear(),
                    GameEvent::GameWon { mark, .. } => {
                        println!("{} wins\n{}", mark, board);
                        games_finished += 1;
                    }
                    GameEvent::GameTied => {
                        println!("Tie\n{}", board);
                        games_finished += 1;
                    }
                    GameEvent::GameStarted => println!("Game started"),
                }

                if matches!(event, GameEvent::GameWon { .. } | GameEvent::GameTied) {
                    if games_finished >= args.games {
                        break;
                    }
                    // Only Cross asks, so two bots do not rematch twice.
                    if local_mark == Some(Mark::Cross) {
                        sleep(Duration::from_millis(args.delay)).await;
                        send(&socket, args.server, &Packet::RematchRequest).await?;
                    }
                }
            }
            Packet::StateSync { version, state: incoming } => {
                state.apply(version, incoming);
            }
            other => println!("Unexpected packet: {:?}", other),
        }

        // Move at most once per reconciled version that hands us the turn.
        let my_turn = match (local_mark, state.get()) {
            (Some(mark), Some(current)) => current.current_turn == Some(mark),
            _ => false,
        };
        if my_turn && moved_on_version != state.version() {
            let cell = open_cells(&board).choose(&mut rand::thread_rng()).copied();
            if let (Some((x, y)), Some(mark)) = (cell, local_mark) {
                sleep(Duration::from_millis(args.delay)).await;
                println!("Playing {} at ({}, {})", mark, x, y);
                send(&socket, args.server, &Packet::MoveRequest { x, y, mark }).await?;
                moved_on_version = state.version();
            }
        }
    }

    println!("Sending disconnect");
    send(&socket, args.server, &Packet::Disconnect).await?;
    println!("Test client finished");

    Ok(())
}
