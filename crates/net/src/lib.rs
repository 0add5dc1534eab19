#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for pkgd
//!
//! Fetching of package artifacts and index files (http, https and file
//! URLs) with retries, per-item progress, cooperative cancellation and
//! BLAKE3 digest verification.

mod client;
pub mod digest;
mod fetch;

pub use client::{NetClient, NetConfig};
pub use digest::{file_digest, verify_file};
pub use fetch::{FetchRequest, FetchResult, Fetcher, HttpFetcher};
