//! Typed messages, the envelope that carries them and handler dispatch.

mod dispatch;
mod envelope;
mod inbox;
mod registry;

pub use dispatch::{DispatchError, Dispatcher};
pub use envelope::{Event, Message, MessageEnvelope, MessageKind, Request};
pub use inbox::PeerInbox;
pub use registry::{HandlerError, HandlerResult, MessageRegistry, MessageRegistryBuilder};
