//! Inbound callback channel of the rendering surface.
//!
//! The surface reports user gestures and map events as short strings, either
//! as HTTP-like requests against a loopback listener or as a buffer that is
//! polled periodically. This crate parses them ([`protocol`]), filters stale
//! and unauthenticated requests ([`dispatcher`]) and owns both transports
//! ([`listener`], [`poller`]).

pub mod dispatcher;
pub mod listener;
pub mod poller;
pub mod protocol;

pub use dispatcher::*;
pub use listener::*;
pub use poller::*;
pub use protocol::*;
