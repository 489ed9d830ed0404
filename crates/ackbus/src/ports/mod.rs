//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driven Ports - the document store and the payload codec
//! - Driving Ports - handlers invoked by the dispatch pipeline

pub mod codec;
pub mod handler;
pub mod store;

pub use codec::{decode_payload, encode_payload, PayloadCodec};
pub use handler::{handler_fn, Handler, HandlerCall, TypedHandler};
pub use store::{ChangeEvent, ChangeFeed, DocumentStore, ExpiryIndex, OperationType};
