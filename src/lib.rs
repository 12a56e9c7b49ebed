//! Themed chat-sticker set generation.
//!
//! The pipeline plans sticker descriptions with a remote text model, renders
//! each slot with a remote image model (falling back to a local placeholder
//! renderer), post-processes the rasters and hands the ordered set to the
//! caller for packaging.

#![allow(clippy::multiple_crate_versions)]
#![deny(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::complexity)]
#![deny(clippy::correctness)]
#![deny(clippy::disallowed_methods)]
#![deny(clippy::expect_used)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::panic)]
#![deny(clippy::perf)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::unreachable)]
#![deny(clippy::unwrap_used)]
#![deny(warnings)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backend;
pub mod canvas;
pub mod cli;
pub mod config;
pub mod constants;
pub mod decode;
pub mod error;
pub mod fonts;
pub mod gemini;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod placeholder;
pub mod planner;
pub mod postprocess;
pub mod synth;

#[cfg(test)]
pub(crate) mod testing;
