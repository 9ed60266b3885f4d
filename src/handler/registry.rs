//! Method registry mapping (service, method) pairs to invocation thunks.
//!
//! The registry is built once before the listener starts and never mutated
//! afterwards, so connection workers read it concurrently without locks.
//! Handlers are async functions taking zero or one decoded parameter and
//! returning a value or a fault; typed wrappers erase the parameter and
//! return types behind the [`Handler`] trait and do the codec work.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::PayloadCodec;
use crate::protocol::StatusCode;

/// Error type handlers may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A dispatch failure, classified for the response status byte.
#[derive(Debug)]
pub enum DispatchError {
    /// The request parameter could not be decoded.
    Deserialize(String),
    /// The handler itself failed.
    Fault(String),
    /// The return value could not be encoded.
    Serialize(String),
}

impl DispatchError {
    /// Status code this failure maps to on the wire.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Deserialize(_) => StatusCode::SerializationError,
            Self::Fault(_) | Self::Serialize(_) => StatusCode::ServiceFault,
        }
    }

    /// Human-readable message carried in the response payload.
    pub fn into_message(self) -> String {
        match self {
            Self::Deserialize(m) | Self::Fault(m) | Self::Serialize(m) => m,
        }
    }
}

/// Trait for registered method thunks.
///
/// `call` receives the request's codec-encoded payload and produces the
/// codec-encoded return value, or a classified failure.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, payload: Bytes) -> BoxFuture<'static, Result<Vec<u8>, DispatchError>>;
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

/// Wrapper that decodes one parameter before calling the handler and encodes
/// the return value after.
pub struct TypedHandler<C, F, P, Fut, R> {
    handler: F,
    _phantom: PhantomData<fn(C, P) -> (Fut, R)>,
}

impl<C, F, P, Fut, R> TypedHandler<C, F, P, Fut, R>
where
    C: PayloadCodec,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<C, F, P, Fut, R> Handler for TypedHandler<C, F, P, Fut, R>
where
    C: PayloadCodec,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn call(&self, payload: Bytes) -> BoxFuture<'static, Result<Vec<u8>, DispatchError>> {
        let param: P = match C::decode(&payload) {
            Ok(v) => v,
            Err(e) => {
                let message = format!("failed to decode parameter: {}", e);
                return Box::pin(async move { Err(DispatchError::Deserialize(message)) });
            }
        };

        let fut = (self.handler)(param);
        Box::pin(async move {
            let value = fut.await.map_err(|e| DispatchError::Fault(e.to_string()))?;
            C::encode(&value).map_err(|e| DispatchError::Serialize(e.to_string()))
        })
    }
}

/// Wrapper for zero-argument methods: skips parameter decoding entirely.
pub struct NullaryHandler<C, F, Fut, R> {
    handler: F,
    _phantom: PhantomData<fn(C) -> (Fut, R)>,
}

impl<C, F, Fut, R> NullaryHandler<C, F, Fut, R>
where
    C: PayloadCodec,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    /// Create a new zero-argument handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<C, F, Fut, R> Handler for NullaryHandler<C, F, Fut, R>
where
    C: PayloadCodec,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn call(&self, _payload: Bytes) -> BoxFuture<'static, Result<Vec<u8>, DispatchError>> {
        let fut = (self.handler)();
        Box::pin(async move {
            let value = fut.await.map_err(|e| DispatchError::Fault(e.to_string()))?;
            C::encode(&value).map_err(|e| DispatchError::Serialize(e.to_string()))
        })
    }
}

/// Entry for a registered method.
struct MethodEntry {
    handler: Box<dyn Handler>,
}

/// Registry mapping service name → method name → handler.
///
/// Built at startup, immutable afterwards.
pub struct ServiceRegistry {
    services: HashMap<String, HashMap<String, MethodEntry>>,
}

impl ServiceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Register a one-parameter method handler.
    pub fn register<C, F, P, Fut, R>(&mut self, service: &str, method: &str, handler: F)
    where
        C: PayloadCodec,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.insert(service, method, Box::new(TypedHandler::<C, _, _, _, _>::new(handler)));
    }

    /// Register a zero-argument method handler.
    pub fn register_nullary<C, F, Fut, R>(&mut self, service: &str, method: &str, handler: F)
    where
        C: PayloadCodec,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.insert(service, method, Box::new(NullaryHandler::<C, _, _, _>::new(handler)));
    }

    fn insert(&mut self, service: &str, method: &str, handler: Box<dyn Handler>) {
        self.services
            .entry(service.to_string())
            .or_default()
            .insert(method.to_string(), MethodEntry { handler });
    }

    /// Resolve a (service, method) pair.
    ///
    /// Returns the descriptive message for the failure response when either
    /// name is unknown; no handler runs in that case.
    pub fn lookup(&self, service: &str, method: &str) -> Result<&dyn Handler, String> {
        let methods = self
            .services
            .get(service)
            .ok_or_else(|| format!("service {} is not registered", service))?;

        methods
            .get(method)
            .map(|entry| entry.handler.as_ref())
            .ok_or_else(|| format!("service {} has no method {}", service, method))
    }

    /// Number of registered services.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
