//! Image supply: block fetching, progressive preloading, the rotating
//! double-buffered queue and its persisted resume snapshot.

pub mod fetcher;
pub mod preloader;
pub mod queue;
pub mod snapshot;
