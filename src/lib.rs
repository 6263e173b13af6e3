//! Selective downloader for whole-cell simulation campaign outputs.
//!
//! A campaign run writes a deep hierarchy of objects into a Google Cloud
//! Storage bucket: one directory per variant, one per seed line, one per
//! generation. Many seed lines stall before the final generation. This crate
//! discovers which seed lines ran to completion, queues the small fixed
//! manifest of per-generation output files for those seeds, and drains the
//! queue with a bounded worker pool plus one serial retry pass.

pub mod app;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod layout;
pub mod mirror;
pub mod output;
pub mod queue;
pub mod storage;
pub mod transfer;
