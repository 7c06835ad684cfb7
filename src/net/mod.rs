//! Remote side of the pipeline: the category endpoint and connectivity.

mod client;
mod payload;
mod reachability;

pub use client::{
    CategorySource, FetchConfig, HttpCategorySource, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT,
};
pub use payload::decode_payload;
pub use reachability::{probe, Reachability};
