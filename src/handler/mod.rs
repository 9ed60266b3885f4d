//! Handler module - service registry and typed method handlers.

mod registry;

pub use registry::{
    BoxError, BoxFuture, DispatchError, Handler, NullaryHandler, ServiceRegistry, TypedHandler,
};
