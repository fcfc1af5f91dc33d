mod client;
mod config;
mod events;
mod server;
mod simulation;

use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, error, info};

use tickwire::SyncConfig;
use tickwire::sync::{DEFAULT_HISTORY_DEPTH, DEFAULT_TICK_RATE};

use client::JoinClient;
use config::{DEFAULT_PORT, HostConfig, JoinConfig};
use events::HostEvent;
use server::HostServer;

#[derive(Parser)]
#[command(name = "tickwire-host")]
#[command(about = "Runs or joins a tickwire simulation over UDP")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Host a simulation and replicate it to every peer that connects
    Host {
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
        tick_rate: u16,

        #[arg(long, default_value_t = DEFAULT_HISTORY_DEPTH)]
        history_depth: usize,

        #[arg(short, long, default_value_t = 8, help = "Number of animated objects")]
        objects: usize,

        #[arg(long, help = "Stop after this many ticks")]
        ticks: Option<u64>,
    },
    /// Join a hosted simulation and report its state once a second
    Join {
        #[arg(help = "Host address, e.g. 127.0.0.1:27960")]
        addr: String,

        #[arg(long, help = "Stop after this many replicated ticks")]
        ticks: Option<u64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Host {
            bind,
            port,
            tick_rate,
            history_depth,
            objects,
            ticks,
        } => {
            let sync = SyncConfig {
                tick_rate,
                history_depth,
                ..Default::default()
            };
            sync.validate()?;
            run_host(HostConfig {
                bind,
                port,
                objects,
                ticks,
                sync,
            })
        }
        Command::Join { addr, ticks } => run_join(JoinConfig {
            endpoint: addr,
            ticks,
            ..Default::default()
        }),
    }
}

fn run_host(config: HostConfig) -> Result<()> {
    let mut server = HostServer::new(config)?;
    match server.local_addr() {
        Some(addr) => info!("Host started on {}", addr),
        None => info!("Host started"),
    }

    let running = server.running();
    while running.load(Ordering::SeqCst) {
        server.tick_once()?;
        log_events(&mut server);
        std::thread::sleep(Duration::from_millis(1));
    }

    info!("Host shutting down at {}", server.session().tick());
    server.shutdown();
    log_events(&mut server);
    Ok(())
}

fn log_events(server: &mut HostServer) {
    for event in server.drain_events() {
        match event {
            HostEvent::PeerJoined {
                peer,
                tick,
                objects,
            } => debug!("Sent init to {} at {} with {} object(s)", peer, tick, objects),
            HostEvent::PeerResynced { peer, tick } => {
                info!("{} fell behind the history and was resynchronized at {}", peer, tick)
            }
            HostEvent::PeerLeft { peer, reason } => debug!("{} {}", peer, reason.as_str()),
            HostEvent::Error { message } => error!("{}", message),
        }
    }
}

fn run_join(config: JoinConfig) -> Result<()> {
    let mut client = JoinClient::new(config)?;
    let running = client.running();
    while running.load(Ordering::SeqCst) {
        client.poll_once()?;
        std::thread::sleep(Duration::from_millis(1));
    }

    client.report();
    client.shutdown();
    info!("Left the simulation");
    Ok(())
}
