//! # rayloc-io: Payloads and Reference Data
//!
//! Importers and exporters around the location engine:
//!
//! - [`json`] - The JSON request/response payloads
//! - [`hydra`] - The legacy Hydra-style text format
//! - [`refdata`] - Craton polygon and zone-statistics loaders
//!
//! The request side validates before it builds: a malformed payload becomes
//! [`rayloc_core::LocError::BadEventInput`] (exit 110) and unreadable
//! reference data becomes `BadAuxData` (exit 114) without touching the
//! engine.

pub mod hydra;
pub mod json;
pub mod refdata;

pub use hydra::{read_request, write_request, write_summary};
pub use json::{LocationRequest, LocationResponse, PickInput, PickOutput};
pub use refdata::{load_cratons, load_zones, parse_cratons, parse_zones};
