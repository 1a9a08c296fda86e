//! Vidmill - batch media-operation orchestration engine
//!
//! This library crate exposes the orchestration layer (configuration,
//! lifecycle, worker pool, job processor) for integration testing. The media
//! model, command planning, probing, and process execution live in
//! `vidmill-av`.

pub mod config;
pub mod lifecycle;
pub mod pool;
pub mod processor;
