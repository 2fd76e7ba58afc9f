//! # ragrag core
//!
//! I/O-free building blocks for the ragrag ingestion pipeline: data
//! models, content hashing, structure-aware chunking, chunk metadata, the
//! paper lifecycle rules, the backoff policy, and the chunk store trait.
//!
//! Nothing in this crate touches the network, the filesystem, or a
//! database. The native app crate wires these pieces to SQLite, HTTP, and
//! the corpus directory.

pub mod backoff;
pub mod chunk;
pub mod hash;
pub mod metadata;
pub mod models;
pub mod papers;
pub mod store;
