//! Delivery pipeline
//!
//! This module contains:
//! - Format policies and output formats
//! - The artifact type and file name normalization
//! - Rendering backends
//! - The pipeline turning a document into artifacts

mod artifact;
mod pipeline;
mod policy;
mod render;

pub use artifact::{normalize_filename, Artifact};
pub use pipeline::{Conversion, DeliveryPipeline};
pub use policy::{FormatPolicy, OutputFormat};
pub use render::{CommandRenderer, ConversionError, Renderer};
