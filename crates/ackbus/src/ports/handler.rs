//! Handler port (driving).
//!
//! Handlers registered on one topic may each expect a different payload
//! type. The registry therefore stores `Arc<dyn Handler>`: each handler
//! knows how to decode the raw payload into its own type and returns a
//! ready-to-run future for the typed callback.

use crate::error::CodecError;
use crate::ports::codec::{decode_payload, PayloadCodec};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A bound handler invocation, ready to be scheduled.
pub type HandlerCall = BoxFuture<'static, anyhow::Result<()>>;

/// Type-erased handler capability.
pub trait Handler: Send + Sync {
    /// Payload type name, for logs.
    fn payload_type(&self) -> &'static str;

    /// Decode `payload` and bind it to the callback.
    fn bind(&self, payload: &[u8], codec: &dyn PayloadCodec) -> Result<HandlerCall, CodecError>;
}

/// [`Handler`] over an async callback taking a decoded `T`.
pub struct TypedHandler<T, F> {
    callback: Arc<F>,
    _payload: PhantomData<fn() -> T>,
}

impl<T, F> TypedHandler<T, F> {
    pub fn new(callback: F) -> Self {
        Self {
            callback: Arc::new(callback),
            _payload: PhantomData,
        }
    }
}

impl<T, F, Fut> Handler for TypedHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn payload_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn bind(&self, payload: &[u8], codec: &dyn PayloadCodec) -> Result<HandlerCall, CodecError> {
        let value: T = decode_payload(codec, payload)?;
        let callback = Arc::clone(&self.callback);
        // The callback itself runs on first poll, never at bind time
        Ok(Box::pin(async move { (*callback)(value).await }))
    }
}

/// Wrap an async closure as a shareable [`Handler`].
pub fn handler_fn<T, F, Fut>(callback: F) -> Arc<dyn Handler>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(TypedHandler::<T, F>::new(callback))
}
