pub mod codec;
pub mod error;
pub mod message;
pub mod net;
pub mod simulation;
pub mod sync;

pub use codec::{ByteReader, ByteWriter, DecodeError, TypeTag, Wire, WireType, type_hash};
pub use error::ConfigError;
pub use message::{
    DispatchError, Dispatcher, Event, HandlerError, HandlerResult, Message, MessageEnvelope,
    MessageKind, MessageRegistry, MessageRegistryBuilder, PeerInbox, Request,
};
pub use net::{
    ConnectionData, LoopbackProtocol, NetworkStats, PeerId, Protocol, ProtocolEvent, ProtocolInfo,
    ProtocolSet, ProtocolType, TransportError, UdpConfig, UdpConnectionData, UdpProtocol,
};
pub use simulation::{
    CommandLog, Component, ComponentReference, ComponentState, IdAllocator, ObjectId, Simulation,
    SimulationCommand, SimulationError, SimulationObject, Transform,
};
pub use sync::{
    BatchError, BatchReport, ClientSession, HostSession, SealedTick, SessionError, SessionState,
    SimulationInitEvent, SimulationTickSnapshot, SimulationTickSnapshotAckRequest,
    SimulationTickSnapshotAckResponse, SimulationTickSnapshotEvent, SnapshotHistory, SyncConfig,
    SyncSignal, Tick, TickTime, register_client_messages, register_host_messages,
};
