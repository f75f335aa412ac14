// Meridian - openEHR Web Template composition converter
// Copyright (c) 2025 Meridian Contributors
// Licensed under the MIT License

//! # Meridian - openEHR Web Template composition converter
//!
//! Meridian converts openEHR compositions between three JSON representations,
//! all driven by a Web Template:
//!
//! - **Flat**: one `path → value` entry per attribute (`vitals/pulse:0/rate|magnitude`)
//! - **Structured**: the same content nested by node id
//! - **Raw**: the canonical, typed reference model tree
//!
//! It also validates raw compositions against the template.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Conversion engine (paths, schema index, values, builder, flattener, validator)
//! - [`domain`] - Web Template model, context bag, RM types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust
//! use meridian::core::convert::{build_composition, validate_composition, ConversionOptions, Format};
//! use meridian::core::schema::SchemaIndex;
//! use meridian::domain::{ContextBag, WebTemplate};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = WebTemplate::from_json_str(r#"{
//!     "templateId": "Pulse.v1",
//!     "defaultLanguage": "en",
//!     "tree": {
//!         "id": "pulse_record", "name": "Pulse record", "rmType": "COMPOSITION", "min": 1,
//!         "nodeId": "openEHR-EHR-COMPOSITION.encounter.v1", "aqlPath": "/",
//!         "children": [{
//!             "id": "pulse", "name": "Pulse", "rmType": "OBSERVATION", "max": -1,
//!             "nodeId": "openEHR-EHR-OBSERVATION.pulse.v2",
//!             "aqlPath": "/content[openEHR-EHR-OBSERVATION.pulse.v2]",
//!             "children": [{
//!                 "id": "any_event", "name": "Any event", "rmType": "EVENT", "max": -1,
//!                 "nodeId": "at0002",
//!                 "aqlPath": "/content[openEHR-EHR-OBSERVATION.pulse.v2]/data[at0001]/events[at0002]",
//!                 "children": [{
//!                     "id": "rate", "name": "Rate", "rmType": "DV_COUNT", "nodeId": "at0004",
//!                     "aqlPath": "/content[openEHR-EHR-OBSERVATION.pulse.v2]/data[at0001]/events[at0002]/data[at0003]/items[at0004]/value"
//!                 }]
//!             }]
//!         }]
//!     }
//! }"#)?;
//!
//! // Index once, convert many times
//! let index = SchemaIndex::build(&template)?;
//!
//! let context = ContextBag::new()
//!     .with_language("en")
//!     .with_territory("IE")
//!     .with_composer_name("Dr. Lee");
//! let flat = json!({"pulse_record/pulse:0/any_event:0/rate": 72});
//! let raw = build_composition(&index, Format::Flat, &flat, &context, &ConversionOptions::default())?;
//!
//! let report = validate_composition(&index, &raw)?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Conversions fail with a [`domain::ConversionError`]; builder failures are
//! wrapped in [`domain::ConversionError::Build`] naming the flat path at fault.
//! Everything else uses [`domain::MeridianError`], which conversion errors
//! convert into with the `?` operator.
//!
//! ## Logging
//!
//! Meridian uses structured logging with the `tracing` crate. The library only
//! emits events; the binary installs the subscriber via [`logging::init_logging`].

#![recursion_limit = "256"]

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
