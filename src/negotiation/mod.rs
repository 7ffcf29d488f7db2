//! Content negotiation subsystem.
//!
//! # Data Flow
//! ```text
//! Request headers
//!     → media.rs (parse Accept ranges / Content-Type essence)
//!     → negotiator.rs (rank, match registrations, consult cache)
//!     → codec.rs (Serializer / Deserializer instance)
//!     → Dispatcher encodes/decodes Beans
//! ```
//!
//! # Design Decisions
//! - Accept ranking: descending q, ties by declaration order
//! - Content-Type is a direct lookup (no ranking)
//! - Codec caches are populate-once, read-many

pub mod codec;
pub mod media;
pub mod negotiator;

use thiserror::Error;

pub use codec::{Bean, BeanType, CodecError, Deserializer, JsonCodec, Serializer, TextCodec};
pub use media::{parse_accept, MediaRange, MediaType};
pub use negotiator::{Negotiator, NegotiatorBuilder};

/// Errors raised while selecting a codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("no acceptable format for '{bean}' in Accept '{accept}'")]
    NoAcceptableFormat { bean: BeanType, accept: String },

    #[error("unsupported content type '{content_type}' for '{bean}'")]
    UnsupportedFormat { bean: BeanType, content_type: String },

    #[error("invalid media type '{0}'")]
    InvalidMediaType(String),
}
