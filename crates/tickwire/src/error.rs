use crate::codec::TypeTag;
use crate::message::MessageKind;
use crate::net::ProtocolType;

/// Setup mistakes. Raised at registration time, never deferred to first use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("type tag {tag} of {new} collides with already registered {existing}")]
    DuplicateTypeTag {
        tag: TypeTag,
        existing: &'static str,
        new: &'static str,
    },
    #[error("{kind:?} handler for {type_name} is already registered")]
    AlreadyRegistered {
        kind: MessageKind,
        type_name: &'static str,
    },
    #[error("protocol {0} is already registered")]
    DuplicateProtocol(ProtocolType),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
