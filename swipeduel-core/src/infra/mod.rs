//! Adapters to the outside world: HTTP, image decoding, durable storage and
//! wall-clock time, plus deterministic stand-ins for tests.

pub mod api;
pub mod api_client;
pub mod clock;
pub mod image_loader;
pub mod storage;
pub mod testing;
