use std::sync::Arc;

use log::warn;

use crate::codec::{DecodeError, TypeTag, Wire};
use crate::net::PeerId;

use super::envelope::{MessageEnvelope, MessageKind};
use super::registry::{HandlerError, MessageRegistry};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] DecodeError),
    #[error("no {kind:?} handler registered for type tag {tag}")]
    UnknownTypeTag { kind: MessageKind, tag: TypeTag },
    #[error("failed to decode {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: DecodeError,
    },
    #[error("{type_name} handler failed: {source}")]
    Handler {
        type_name: &'static str,
        #[source]
        source: HandlerError,
    },
}

type DiagnosticObserver = Box<dyn Fn(PeerId, &DispatchError) + Send + Sync>;

/// Routes inbound envelopes to the handlers of a shared registry.
///
/// Failures never close the connection. They are returned, logged and
/// passed to every diagnostic observer, and the message is dropped.
pub struct Dispatcher<C> {
    registry: Arc<MessageRegistry<C>>,
    observers: Vec<DiagnosticObserver>,
}

impl<C> Dispatcher<C> {
    pub fn new(registry: Arc<MessageRegistry<C>>) -> Self {
        Self {
            registry,
            observers: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<MessageRegistry<C>> {
        &self.registry
    }

    pub fn on_diagnostic<F>(&mut self, observer: F)
    where
        F: Fn(PeerId, &DispatchError) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Runs the handler registered for the envelope. Requests yield the response to send back.
    pub fn dispatch(
        &self,
        ctx: &mut C,
        peer: PeerId,
        envelope: MessageEnvelope,
    ) -> Result<Option<MessageEnvelope>, DispatchError> {
        let result = self.route(ctx, peer, &envelope);
        if let Err(err) = &result {
            self.report(peer, err);
        }
        result
    }

    /// Decodes a raw frame into an envelope and dispatches it.
    pub fn dispatch_bytes(
        &self,
        ctx: &mut C,
        peer: PeerId,
        bytes: &[u8],
    ) -> Result<Option<MessageEnvelope>, DispatchError> {
        match MessageEnvelope::from_bytes(bytes) {
            Ok(envelope) => self.dispatch(ctx, peer, envelope),
            Err(source) => {
                let err = DispatchError::Envelope(source);
                self.report(peer, &err);
                Err(err)
            }
        }
    }

    fn route(
        &self,
        ctx: &mut C,
        peer: PeerId,
        envelope: &MessageEnvelope,
    ) -> Result<Option<MessageEnvelope>, DispatchError> {
        let registration = self
            .registry
            .get(envelope.kind(), envelope.tag())
            .ok_or(DispatchError::UnknownTypeTag {
                kind: envelope.kind(),
                tag: envelope.tag(),
            })?;

        log::trace!(
            "dispatching {:?} {} from {}",
            envelope.kind(),
            registration.type_name,
            peer
        );
        (registration.handler)(ctx, peer, envelope.payload())
    }

    fn report(&self, peer: PeerId, err: &DispatchError) {
        warn!("Dropped message from {}: {}", peer, err);
        for observer in &self.observers {
            observer(peer, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::codec::{ByteReader, ByteWriter, WireType};
    use crate::message::{Event, Request};
    use crate::net::ProtocolType;

    #[derive(Debug, PartialEq)]
    struct Add(u32, u32);

    impl WireType for Add {
        const TYPE_NAME: &'static str = "tests::Add";
    }

    impl Wire for Add {
        fn encode(&self, writer: &mut ByteWriter) {
            writer.write_u32(self.0);
            writer.write_u32(self.1);
        }

        fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
            Ok(Self(reader.read_u32()?, reader.read_u32()?))
        }
    }

    impl Request for Add {
        type Response = Sum;
    }

    #[derive(Debug, PartialEq)]
    struct Sum(u32);

    impl WireType for Sum {
        const TYPE_NAME: &'static str = "tests::Sum";
    }

    impl Wire for Sum {
        fn encode(&self, writer: &mut ByteWriter) {
            writer.write_u32(self.0);
        }

        fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
            reader.read_u32().map(Self)
        }
    }

    struct Tick;

    impl WireType for Tick {
        const TYPE_NAME: &'static str = "tests::Tick";
    }

    impl Wire for Tick {
        fn encode(&self, _writer: &mut ByteWriter) {}

        fn decode(_reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
            Ok(Self)
        }
    }

    impl Event for Tick {}

    fn peer() -> PeerId {
        PeerId::new(ProtocolType::named("tests"), 0)
    }

    fn dispatcher() -> Dispatcher<u32> {
        let mut builder = MessageRegistry::<u32>::builder();
        builder
            .request::<Add, _>(|_, _, Add(a, b)| Ok(Sum(a + b)))
            .unwrap()
            .event::<Tick, _>(|ticks, _, _| {
                *ticks += 1;
                if *ticks > 2 {
                    return Err("too many ticks".into());
                }
                Ok(())
            })
            .unwrap();
        Dispatcher::new(Arc::new(builder.build()))
    }

    #[test]
    fn request_produces_response() {
        let dispatcher = dispatcher();
        let mut ctx = 0;

        let reply = dispatcher
            .dispatch(&mut ctx, peer(), MessageEnvelope::request(&Add(2, 3)))
            .unwrap()
            .unwrap();

        assert_eq!(reply.kind(), MessageKind::Response);
        assert_eq!(reply.open::<Sum>(), Some(Ok(Sum(5))));
    }

    #[test]
    fn event_runs_handler_without_reply() {
        let dispatcher = dispatcher();
        let mut ticks = 0;

        let reply = dispatcher
            .dispatch(&mut ticks, peer(), MessageEnvelope::event(&Tick))
            .unwrap();

        assert!(reply.is_none());
        assert_eq!(ticks, 1);
    }

    #[test]
    fn failures_reach_observers() {
        let mut dispatcher = dispatcher();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        dispatcher.on_diagnostic(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut ticks = 2;
        let err = dispatcher
            .dispatch(&mut ticks, peer(), MessageEnvelope::event(&Tick))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handler { type_name: "tests::Tick", .. }));

        let err = dispatcher.dispatch_bytes(&mut ticks, peer(), &[1, 2]).unwrap_err();
        assert!(matches!(err, DispatchError::Envelope(_)));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn trailing_payload_bytes_are_rejected() {
        let dispatcher = dispatcher();
        let mut payload = Add(1, 1).to_bytes();
        payload.push(0);
        let envelope = MessageEnvelope::new(MessageKind::Request, Add::TYPE_TAG, payload);

        let err = dispatcher.dispatch(&mut 0, peer(), envelope).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Decode {
                type_name: "tests::Add",
                source: DecodeError::TrailingBytes(1)
            }
        ));
    }

    #[test]
    fn kind_is_part_of_the_key() {
        let dispatcher = dispatcher();
        let envelope = MessageEnvelope::new(MessageKind::Event, Add::TYPE_TAG, Add(1, 2).to_bytes());

        let err = dispatcher.dispatch(&mut 0, peer(), envelope).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UnknownTypeTag {
                kind: MessageKind::Event,
                ..
            }
        ));
    }
}
