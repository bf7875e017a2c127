pub mod clock;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod store;
pub mod ticker;
pub mod wal;

#[cfg(test)]
pub(crate) mod testutil;
