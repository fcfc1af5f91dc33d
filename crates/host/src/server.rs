use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::debug;

use tickwire::{
    Dispatcher, HostSession, MessageEnvelope, MessageRegistry, ObjectId, PeerId, Protocol,
    ProtocolEvent, ProtocolSet, SyncSignal, TickTime, UdpProtocol, register_host_messages,
};

use crate::config::HostConfig;
use crate::events::{HostEvent, LeaveReason};
use crate::simulation::{animate, spawn_objects};

pub struct HostServer {
    protocols: ProtocolSet,
    dispatcher: Dispatcher<HostSession>,
    session: HostSession,
    config: HostConfig,
    objects: Vec<ObjectId>,
    local_addr: Option<SocketAddr>,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    start_time: Instant,
    ticks_run: u64,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<HostEvent>,
}

impl HostServer {
    pub fn new(config: HostConfig) -> Result<Self> {
        let mut udp = UdpProtocol::new(config.udp());
        udp.listen(config.port)
            .with_context(|| format!("failed to listen on {}:{}", config.bind, config.port))?;
        let local_addr = udp.local_addr();

        let mut protocols = ProtocolSet::new();
        protocols.register(udp)?;

        let mut builder = MessageRegistry::<HostSession>::builder();
        register_host_messages(&mut builder)?;
        let dispatcher = Dispatcher::new(Arc::new(builder.build()));

        let mut session = HostSession::new(config.sync.clone())?;
        session.start()?;
        let objects = spawn_objects(&mut session, config.objects)?;

        Ok(Self {
            protocols,
            dispatcher,
            session,
            tick_duration: config.sync.tick_interval(),
            objects,
            local_addr,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            start_time: Instant::now(),
            ticks_run: 0,
            running: Arc::new(AtomicBool::new(true)),
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn session(&self) -> &HostSession {
        &self.session
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = HostEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn tick_once(&mut self) -> Result<()> {
        let now = Instant::now();
        let delta = now - self.last_tick_time;
        self.last_tick_time = now;
        self.accumulator += delta;

        self.process_network()?;

        while self.accumulator >= self.tick_duration && self.running.load(Ordering::SeqCst) {
            self.accumulator -= self.tick_duration;
            self.tick()?;
        }
        Ok(())
    }

    pub fn shutdown(&mut self) {
        let peers: Vec<PeerId> = self.session.peers().collect();
        for peer in peers {
            let _ = self.protocols.disconnect(peer);
            if self.session.remove_peer(peer).is_ok() {
                self.pending_events.push_back(HostEvent::PeerLeft {
                    peer,
                    reason: LeaveReason::Shutdown,
                });
            }
        }
        self.session.teardown();
    }

    fn tick(&mut self) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        animate(&mut self.session, &self.objects, elapsed)?;

        let sealed = self.session.end_tick(TickTime::now())?;
        for signal in sealed.signals {
            if let SyncSignal::HistoryOverrun { peer, .. } = signal {
                self.send_init(peer, true);
            }
        }
        self.broadcast_snapshots();

        self.ticks_run += 1;
        if self.config.ticks.is_some_and(|limit| self.ticks_run >= limit) {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn broadcast_snapshots(&mut self) {
        let peers: Vec<PeerId> = self.session.peers().collect();
        for peer in peers {
            let batches = match self.session.outgoing(peer) {
                Ok(batches) => batches,
                Err(e) => {
                    self.report(format!("Failed to collect snapshots for {}: {}", peer, e));
                    continue;
                }
            };
            for batch in batches {
                if let Err(e) = self.protocols.send(peer, &MessageEnvelope::event(&batch)) {
                    self.report(format!("Failed to send snapshots to {}: {}", peer, e));
                    break;
                }
            }
        }
    }

    fn process_network(&mut self) -> Result<()> {
        for event in self.protocols.poll() {
            match event {
                ProtocolEvent::PeerConnected { peer, .. } => self.send_init(peer, false),
                ProtocolEvent::PeerDisconnected { peer } => {
                    if self.session.remove_peer(peer).is_ok() {
                        self.pending_events.push_back(HostEvent::PeerLeft {
                            peer,
                            reason: LeaveReason::Disconnected,
                        });
                    }
                }
                ProtocolEvent::Received { peer, bytes } => {
                    // Dispatch failures are logged by the dispatcher and never drop the peer.
                    let reply = self.dispatcher.dispatch_bytes(&mut self.session, peer, &bytes);
                    if let Ok(Some(reply)) = reply {
                        if let Err(e) = self.protocols.send(peer, &reply) {
                            self.report(format!("Failed to answer {}: {}", peer, e));
                        }
                    }
                }
                // Logged by the protocol set.
                ProtocolEvent::NetworkError { .. } => {}
            }
        }

        if self.session.is_poisoned() {
            anyhow::bail!("host session is poisoned");
        }
        Ok(())
    }

    fn send_init(&mut self, peer: PeerId, resync: bool) {
        let init = match self.session.add_peer(peer) {
            Ok(init) => init,
            Err(e) => {
                self.report(format!("Failed to add {}: {}", peer, e));
                return;
            }
        };
        let tick = init.snapshot.tick;
        debug!(
            "Init for {} carries {} command(s)",
            peer,
            init.snapshot.commands.len()
        );

        if let Err(e) = self.protocols.send(peer, &MessageEnvelope::event(&init)) {
            self.report(format!("Failed to send init to {}: {}", peer, e));
            return;
        }

        self.pending_events.push_back(if resync {
            HostEvent::PeerResynced { peer, tick }
        } else {
            HostEvent::PeerJoined {
                peer,
                tick,
                objects: self.session.simulation().object_count(),
            }
        });
    }

    fn report(&mut self, message: String) {
        self.pending_events.push_back(HostEvent::Error { message });
    }
}
