use std::fmt;

use crate::net::PeerId;

use super::tick::Tick;

/// Desync conditions. Reported to the embedder; the session never disconnects on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSignal {
    /// A snapshot arrived whose predecessor was never applied.
    TickGap { expected: Tick, received: Tick },
    /// The remote tick is too far ahead of the local cursor to catch up.
    TotalDesync { local: Tick, remote: Tick },
    /// The host evicted snapshots this peer had not acknowledged. It needs a fresh init.
    HistoryOverrun { peer: PeerId, acknowledged: Tick },
}

impl fmt::Display for SyncSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TickGap { expected, received } => {
                write!(f, "tick gap: expected {}, received {}", expected, received)
            }
            Self::TotalDesync { local, remote } => {
                write!(f, "total desync: local {}, remote {}", local, remote)
            }
            Self::HistoryOverrun { peer, acknowledged } => write!(
                f,
                "history overrun: {} acknowledged only up to {}",
                peer, acknowledged
            ),
        }
    }
}

type SignalObserver = Box<dyn FnMut(&SyncSignal) + Send>;

#[derive(Default)]
pub(crate) struct SignalObservers {
    observers: Vec<SignalObserver>,
}

impl SignalObservers {
    pub(crate) fn push(&mut self, observer: SignalObserver) {
        self.observers.push(observer);
    }

    pub(crate) fn emit(&mut self, signal: &SyncSignal) {
        log::warn!("{}", signal);
        for observer in &mut self.observers {
            observer(signal);
        }
    }
}

impl fmt::Debug for SignalObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalObservers")
            .field("len", &self.observers.len())
            .finish()
    }
}
