use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::codec::TypeTag;
use crate::error::ConfigError;
use crate::net::PeerId;

use super::dispatch::DispatchError;
use super::envelope::{Event, Message, MessageEnvelope, MessageKind, Request};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult<T> = Result<T, HandlerError>;

type ErasedHandler<C> = Box<
    dyn Fn(&mut C, PeerId, &[u8]) -> Result<Option<MessageEnvelope>, DispatchError> + Send + Sync,
>;

pub(crate) struct Registration<C> {
    pub(crate) type_name: &'static str,
    pub(crate) handler: ErasedHandler<C>,
}

/// Handler table keyed by message kind and type tag. Immutable once built.
pub struct MessageRegistry<C> {
    names: HashMap<TypeTag, &'static str>,
    entries: HashMap<(MessageKind, TypeTag), Registration<C>>,
}

impl<C> MessageRegistry<C> {
    pub fn builder() -> MessageRegistryBuilder<C> {
        MessageRegistryBuilder::new()
    }

    pub fn contains(&self, kind: MessageKind, tag: TypeTag) -> bool {
        self.entries.contains_key(&(kind, tag))
    }

    pub fn type_name(&self, tag: TypeTag) -> Option<&'static str> {
        self.names.get(&tag).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, kind: MessageKind, tag: TypeTag) -> Option<&Registration<C>> {
        self.entries.get(&(kind, tag))
    }
}

pub struct MessageRegistryBuilder<C> {
    names: HashMap<TypeTag, &'static str>,
    entries: HashMap<(MessageKind, TypeTag), Registration<C>>,
}

impl<C> Default for MessageRegistryBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> MessageRegistryBuilder<C> {
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Registers the handler for incoming `R` requests. Its return value is sent back as the response.
    pub fn request<R, F>(&mut self, handler: F) -> Result<&mut Self, ConfigError>
    where
        R: Request,
        F: Fn(&mut C, PeerId, R) -> HandlerResult<R::Response> + Send + Sync + 'static,
    {
        self.insert::<R>(
            MessageKind::Request,
            Box::new(move |ctx, peer, payload| {
                let request = decode::<R>(payload)?;
                let response = handler(ctx, peer, request).map_err(|source| {
                    DispatchError::Handler {
                        type_name: R::TYPE_NAME,
                        source,
                    }
                })?;
                Ok(Some(MessageEnvelope::response(&response)))
            }),
        )
    }

    pub fn event<E, F>(&mut self, handler: F) -> Result<&mut Self, ConfigError>
    where
        E: Event,
        F: Fn(&mut C, PeerId, E) -> HandlerResult<()> + Send + Sync + 'static,
    {
        self.insert::<E>(MessageKind::Event, erase_one_way(handler))
    }

    /// Registers the handler for responses to requests this side sent.
    pub fn response<M, F>(&mut self, handler: F) -> Result<&mut Self, ConfigError>
    where
        M: Message,
        F: Fn(&mut C, PeerId, M) -> HandlerResult<()> + Send + Sync + 'static,
    {
        self.insert::<M>(MessageKind::Response, erase_one_way(handler))
    }

    pub fn build(self) -> MessageRegistry<C> {
        MessageRegistry {
            names: self.names,
            entries: self.entries,
        }
    }

    fn insert<M: Message>(
        &mut self,
        kind: MessageKind,
        handler: ErasedHandler<C>,
    ) -> Result<&mut Self, ConfigError> {
        match self.names.get(&M::TYPE_TAG) {
            Some(&existing) if existing != M::TYPE_NAME => {
                return Err(ConfigError::DuplicateTypeTag {
                    tag: M::TYPE_TAG,
                    existing,
                    new: M::TYPE_NAME,
                });
            }
            _ => {}
        }

        match self.entries.entry((kind, M::TYPE_TAG)) {
            Entry::Occupied(_) => Err(ConfigError::AlreadyRegistered {
                kind,
                type_name: M::TYPE_NAME,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    type_name: M::TYPE_NAME,
                    handler,
                });
                self.names.insert(M::TYPE_TAG, M::TYPE_NAME);
                Ok(self)
            }
        }
    }
}

fn decode<M: Message>(payload: &[u8]) -> Result<M, DispatchError> {
    M::from_bytes(payload).map_err(|source| DispatchError::Decode {
        type_name: M::TYPE_NAME,
        source,
    })
}

fn erase_one_way<C, M, F>(handler: F) -> ErasedHandler<C>
where
    M: Message,
    F: Fn(&mut C, PeerId, M) -> HandlerResult<()> + Send + Sync + 'static,
{
    Box::new(move |ctx, peer, payload| {
        let message = decode::<M>(payload)?;
        handler(ctx, peer, message).map_err(|source| DispatchError::Handler {
            type_name: M::TYPE_NAME,
            source,
        })?;
        Ok(None)
    })
}
