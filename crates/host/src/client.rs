use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;

use tickwire::{
    ClientSession, Dispatcher, MessageEnvelope, MessageRegistry, PeerId, ProtocolEvent,
    ProtocolSet, SessionState, Tick, UdpConfig, UdpProtocol, register_client_messages,
};

use crate::config::JoinConfig;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

pub struct JoinClient {
    protocols: ProtocolSet,
    dispatcher: Dispatcher<ClientSession>,
    session: ClientSession,
    config: JoinConfig,
    host: PeerId,
    first_tick: Option<Tick>,
    last_report: Instant,
    running: Arc<AtomicBool>,
}

impl JoinClient {
    pub fn new(config: JoinConfig) -> Result<Self> {
        let mut protocols = ProtocolSet::new();
        protocols.register(UdpProtocol::new(UdpConfig::default()))?;
        let host = protocols
            .connect(UdpProtocol::PROTOCOL_TYPE, &config.endpoint, &[])
            .with_context(|| format!("failed to connect to {}", config.endpoint))?;

        let mut builder = MessageRegistry::<ClientSession>::builder();
        register_client_messages(&mut builder)?;
        let dispatcher = Dispatcher::new(Arc::new(builder.build()));

        let mut session = ClientSession::new(config.sync.clone())?;
        session.begin()?;

        Ok(Self {
            protocols,
            dispatcher,
            session,
            config,
            host,
            first_tick: None,
            last_report: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn poll_once(&mut self) -> Result<()> {
        for event in self.protocols.poll() {
            match event {
                ProtocolEvent::PeerConnected { peer, .. } if peer == self.host => {
                    info!("Connected to {}, waiting for init", self.config.endpoint);
                }
                ProtocolEvent::PeerDisconnected { peer } if peer == self.host => {
                    info!("Host closed the connection");
                    self.running.store(false, Ordering::SeqCst);
                }
                ProtocolEvent::Received { peer, bytes } => {
                    // Failures are logged by the dispatcher; the host resends what we miss.
                    let _ = self.dispatcher.dispatch_bytes(&mut self.session, peer, &bytes);
                }
                _ => {}
            }
        }

        if self.session.is_poisoned() {
            anyhow::bail!("client session is poisoned");
        }
        if self.session.state() != SessionState::Running {
            return Ok(());
        }

        if let Some(ack) = self.session.take_ack() {
            self.protocols
                .send(self.host, &MessageEnvelope::request(&ack))
                .context("failed to acknowledge snapshots")?;
        }

        let first_tick = *self.first_tick.get_or_insert(self.session.tick());
        if let Some(limit) = self.config.ticks {
            if u64::from(self.session.tick().distance_from(first_tick)) >= limit {
                self.running.store(false, Ordering::SeqCst);
            }
        }

        if self.last_report.elapsed() >= REPORT_INTERVAL {
            self.last_report = Instant::now();
            self.report();
        }
        Ok(())
    }

    pub fn report(&self) {
        let simulation = self.session.simulation();
        info!(
            "{}: {} object(s), checksum {:016x}",
            self.session.tick(),
            simulation.object_count(),
            simulation.checksum()
        );
    }

    pub fn shutdown(&mut self) {
        let _ = self.protocols.disconnect(self.host);
        self.session.teardown();
    }
}
