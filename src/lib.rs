#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod builder;
pub mod bundle;
pub mod config;
pub mod error;
pub mod generator;
pub mod models;
pub mod paths;
pub mod plugins;
pub mod postprocess;
pub mod reader;
pub mod selection;
pub mod variant;

pub use builder::{
  BinaryReport, BundleOutcome, BundleProcessor, BundleReport, DEBUG_DIR, ProcessReport,
  ProcessRequest, REPORT_FILE,
};
pub use config::BundlerConfig;
pub use error::{BundlingError, BundlingResult};
pub use models::{Bundle, BundlePath, FilePathMapping, ResourceType};
pub use plugins::{GlobalProcessor, PluginRegistry};
pub use postprocess::{ProcessingStatus, Processor};
pub use selection::{AllBundles, BundleInclusion, BundleSelection};
