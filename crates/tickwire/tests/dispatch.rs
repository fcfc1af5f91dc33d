use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tickwire::{
    ByteReader, ByteWriter, ConfigError, DecodeError, DispatchError, Dispatcher, Event,
    LoopbackProtocol, MessageEnvelope, MessageKind, MessageRegistry, PeerId, PeerInbox, Protocol,
    ProtocolEvent, Request, TypeTag, Wire, WireType,
};

#[derive(Debug, Clone, PartialEq)]
struct Chat {
    author: String,
    text: String,
}

impl WireType for Chat {
    const TYPE_NAME: &'static str = "demo::Chat";
}

impl Event for Chat {}

impl Wire for Chat {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_str(&self.author);
        writer.write_str(&self.text);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            author: reader.read_string()?,
            text: reader.read_string()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ping {
    nonce: u64,
}

impl WireType for Ping {
    const TYPE_NAME: &'static str = "demo::Ping";
}

impl Request for Ping {
    type Response = Pong;
}

impl Wire for Ping {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.nonce);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            nonce: reader.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pong {
    nonce: u64,
}

impl WireType for Pong {
    const TYPE_NAME: &'static str = "demo::Pong";
}

impl Wire for Pong {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.nonce);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            nonce: reader.read_u64()?,
        })
    }
}

#[derive(Default)]
struct Room {
    log: Vec<(PeerId, Chat)>,
    pongs: Vec<u64>,
}

fn registry() -> Arc<MessageRegistry<Room>> {
    let mut builder = MessageRegistry::<Room>::builder();
    builder
        .event::<Chat, _>(|room, peer, chat| {
            room.log.push((peer, chat));
            Ok(())
        })
        .unwrap()
        .request::<Ping, _>(|_, _, ping| Ok(Pong { nonce: ping.nonce }))
        .unwrap()
        .response::<Pong, _>(|room, _, pong| {
            room.pongs.push(pong.nonce);
            Ok(())
        })
        .unwrap();
    Arc::new(builder.build())
}

fn chat(text: &str) -> Chat {
    Chat {
        author: "ana".to_string(),
        text: text.to_string(),
    }
}

#[test]
fn test_request_response_over_loopback() {
    let (mut host, mut client) = LoopbackProtocol::pair();
    host.listen(0).unwrap();
    let to_host = client.connect("loopback", &[]).unwrap();

    let dispatcher = Dispatcher::new(registry());
    let mut host_room = Room::default();
    let mut client_room = Room::default();

    client
        .send(to_host, &MessageEnvelope::request(&Ping { nonce: 42 }))
        .unwrap();

    for event in host.poll() {
        if let ProtocolEvent::Received { peer, bytes } = event {
            let reply = dispatcher
                .dispatch_bytes(&mut host_room, peer, &bytes)
                .unwrap()
                .expect("requests produce a response");
            host.send(peer, &reply).unwrap();
        }
    }

    for event in client.poll() {
        if let ProtocolEvent::Received { peer, bytes } = event {
            assert!(dispatcher
                .dispatch_bytes(&mut client_room, peer, &bytes)
                .unwrap()
                .is_none());
        }
    }

    assert_eq!(client_room.pongs, vec![42]);
}

#[test]
fn test_unregistered_tag_is_dropped_with_one_diagnostic() {
    let (mut host, mut client) = LoopbackProtocol::pair();
    host.listen(0).unwrap();
    let to_host = client.connect("loopback", &[]).unwrap();

    let mut dispatcher = Dispatcher::new(registry());
    let diagnostics = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&diagnostics);
    dispatcher.on_diagnostic(move |peer, err| {
        sink.lock().unwrap().push((peer, err.to_string()));
    });

    let unknown = MessageEnvelope::new(MessageKind::Event, TypeTag::of("demo::Unknown"), vec![1]);
    client.send(to_host, &unknown).unwrap();
    client
        .send(to_host, &MessageEnvelope::event(&chat("still here")))
        .unwrap();

    let mut room = Room::default();
    let mut outcomes = Vec::new();
    for event in host.poll() {
        if let ProtocolEvent::Received { peer, bytes } = event {
            outcomes.push(dispatcher.dispatch_bytes(&mut room, peer, &bytes));
        }
    }

    assert!(matches!(
        outcomes[0],
        Err(DispatchError::UnknownTypeTag {
            kind: MessageKind::Event,
            ..
        })
    ));
    assert!(outcomes[1].is_ok());
    assert_eq!(diagnostics.lock().unwrap().len(), 1);
    assert_eq!(room.log.len(), 1);
    assert!(host.is_connected());
}

#[test]
fn test_malformed_payload_does_not_reach_handler() {
    let dispatcher = Dispatcher::new(registry());
    let mut room = Room::default();
    let peer = LoopbackProtocol::REMOTE;

    let truncated = MessageEnvelope::new(MessageKind::Event, Chat::TYPE_TAG, vec![5, b'a']);
    let err = dispatcher.dispatch(&mut room, peer, truncated).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Decode {
            type_name: "demo::Chat",
            source: DecodeError::UnexpectedEof { .. }
        }
    ));
    assert!(room.log.is_empty());
}

#[test]
fn test_duplicate_registration_fails_fast() {
    let mut builder = MessageRegistry::<Room>::builder();
    builder.event::<Chat, _>(|_, _, _| Ok(())).unwrap();
    assert!(matches!(
        builder.event::<Chat, _>(|_, _, _| Ok(())),
        Err(ConfigError::AlreadyRegistered { .. })
    ));
}

#[test]
fn test_per_peer_fifo_across_workers() {
    let registry = registry();
    let protocol = LoopbackProtocol::PROTOCOL_TYPE;
    let mut inbox = PeerInbox::new();

    for index in 0..4u32 {
        for n in 0..25 {
            let frame = MessageEnvelope::event(&chat(&format!("{}-{}", index, n))).to_bytes();
            inbox.push(PeerId::new(protocol, index), frame);
        }
    }

    let handled = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = inbox
        .peers()
        .into_iter()
        .map(|peer| {
            let frames = inbox.drain(peer);
            let dispatcher = Dispatcher::new(Arc::clone(&registry));
            let handled = Arc::clone(&handled);
            thread::spawn(move || {
                let mut room = Room::default();
                for frame in frames {
                    dispatcher.dispatch_bytes(&mut room, peer, &frame).unwrap();
                    handled.fetch_add(1, Ordering::SeqCst);
                }
                room.log
            })
        })
        .collect();

    for worker in workers {
        let log = worker.join().unwrap();
        let texts: Vec<String> = log.into_iter().map(|(_, chat)| chat.text).collect();
        let index = texts[0].split('-').next().unwrap().to_string();
        let expected: Vec<String> = (0..25).map(|n| format!("{}-{}", index, n)).collect();
        assert_eq!(texts, expected);
    }
    assert_eq!(handled.load(Ordering::SeqCst), 100);
    assert!(inbox.is_empty());
}
