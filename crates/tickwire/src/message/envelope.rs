use crate::codec::{ByteReader, ByteWriter, DecodeError, TypeTag, Wire, WireType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Request = 0,
    Response = 1,
    Event = 2,
}

impl TryFrom<u8> for MessageKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            2 => Ok(Self::Event),
            _ => Err(DecodeError::InvalidDiscriminant {
                what: "message kind",
                value,
            }),
        }
    }
}

pub trait Message: Wire + WireType + Send + 'static {}

impl<T: Wire + WireType + Send + 'static> Message for T {}

/// A message that expects exactly one response.
pub trait Request: Message {
    type Response: Message;
}

pub trait Event: Message {}

/// `[1 byte kind][8 bytes type tag][payload]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    kind: MessageKind,
    tag: TypeTag,
    payload: Vec<u8>,
}

impl MessageEnvelope {
    pub const HEADER_LEN: usize = 9;

    pub fn new(kind: MessageKind, tag: TypeTag, payload: Vec<u8>) -> Self {
        Self { kind, tag, payload }
    }

    pub fn request<R: Request>(request: &R) -> Self {
        Self::new(MessageKind::Request, R::TYPE_TAG, request.to_bytes())
    }

    pub fn response<M: Message>(response: &M) -> Self {
        Self::new(MessageKind::Response, M::TYPE_TAG, response.to_bytes())
    }

    pub fn event<E: Event>(event: &E) -> Self {
        Self::new(MessageKind::Event, E::TYPE_TAG, event.to_bytes())
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn is<M: Message>(&self) -> bool {
        self.tag == M::TYPE_TAG
    }

    /// Decodes the payload as `M`, returning `None` when the tag belongs to another type.
    pub fn open<M: Message>(&self) -> Option<Result<M, DecodeError>> {
        self.is::<M>().then(|| M::from_bytes(&self.payload))
    }
}

impl Wire for MessageEnvelope {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.kind as u8);
        writer.write(&self.tag);
        writer.write_raw(&self.payload);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let kind = MessageKind::try_from(reader.read_u8()?)?;
        let tag = reader.read()?;
        let payload = reader.read_rest().to_vec();
        Ok(Self { kind, tag, payload })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(Self::HEADER_LEN + self.payload.len());
        self.encode(&mut writer);
        writer.into_bytes()
    }
}
