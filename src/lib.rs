#![deny(clippy::all)]

//! Background removal for generated sprites.
//!
//! A remote removal service is tried first; whenever it is unavailable, slow
//! or returns garbage, a local heuristic takes over: the background color is
//! estimated from the four image corners and every near-white, chroma-green
//! (optional) or background-colored pixel is made transparent.

pub mod background;
pub mod cache;
pub mod classify;
pub mod color;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod remote;
pub mod sample;
pub mod source;

#[cfg(feature = "napi")]
mod node;

pub use crate::classify::{ClassificationParameters, GreenKeyThresholds};
pub use crate::config::CutoutConfig;
pub use crate::error::{CutoutError, Result};
pub use crate::orchestrator::{
  Cutout, Failure, Orchestrator, OrchestratorSettings, ProcessingResult, ResultOrigin, Stage,
};
pub use crate::process::{remove_background_locally, LocalCutout, ProcessingOptions};
pub use crate::source::{BackgroundHint, GenerationRequest};
