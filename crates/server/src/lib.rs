//! HTTP surface of the reelpress transcode worker.

pub mod api;
pub mod metrics;
pub mod state;
