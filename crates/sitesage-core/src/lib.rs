//! # sitesage core
//!
//! Shared, WASM-safe logic for sitesage: data models, URL categorisation,
//! semantic chunking, the dense and lexical indexes, hybrid rank fusion,
//! and the pure half of the rerank contract.
//!
//! This crate contains no tokio, network, or filesystem dependencies.
//! Everything that talks to a model (embedding, reranking, generation)
//! lives in the `sitesage` app crate and feeds plain vectors and strings
//! into the functions defined here.

pub mod category;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod rerank;
pub mod retrieve;
