#![doc = "swagger-to-sdk-core: core logic library for swagger-to-sdk."]

//! This crate holds the option merging, the reconciliation of generated
//! output with the SDK repository and the build driver sequencing them.
//! Git, the review host REST API and the code generator are reached only
//! through the traits of [`contract`]; the binary crate provides the real
//! implementations.

pub mod build;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod options;
pub mod pull_request;
pub mod reconcile;
