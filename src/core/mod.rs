//! Core conversion logic for Meridian.
//!
//! This module contains the schema-driven conversion engine.
//!
//! # Modules
//!
//! - [`path`] - Flat path grammar, AQL placement and the structured format
//! - [`schema`] - Schema index built from a Web Template, ISM transition tables
//! - [`value`] - Typed data values and their coercion from flat attributes
//! - [`builder`] - Flat or structured document → raw composition
//! - [`flatten`] - Raw composition → flat document
//! - [`validation`] - Raw composition compliance checks
//! - [`convert`] - Format-aware entry points and conversion options
//!
//! # Conversion Workflow
//!
//! 1. **Index**: Build a [`schema::SchemaIndex`] once per Web Template
//! 2. **Build**: Turn flat or structured input plus a context bag into a raw tree
//! 3. **Validate** (optional): Re-check a raw tree against the schema
//! 4. **Flatten**: Turn a raw tree back into flat or structured output
//!
//! # Example
//!
//! ```rust
//! use meridian::core::convert::{build_composition, flatten_composition, ConversionOptions, Format};
//! use meridian::core::schema::SchemaIndex;
//! use meridian::domain::{ContextBag, WebTemplate};
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let template = WebTemplate::from_json_str(r#"{
//!     "templateId": "Note.v1",
//!     "tree": {"id": "note", "name": "Note", "rmType": "COMPOSITION", "min": 1,
//!              "nodeId": "openEHR-EHR-COMPOSITION.note.v1", "aqlPath": "/"}
//! }"#)?;
//! let index = SchemaIndex::build(&template)?;
//!
//! let context = ContextBag::new()
//!     .with_language("en")
//!     .with_territory("GB")
//!     .with_composer_name("Dr. Lee");
//! let raw = build_composition(&index, Format::Flat, &json!({}), &context, &ConversionOptions::default())?;
//!
//! let flat = flatten_composition(&index, &raw, Format::Flat, None)?;
//! assert_eq!(flat["note/territory|code"], "GB");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod builder;
pub mod convert;
pub mod flatten;
pub mod path;
pub mod schema;
pub mod validation;
pub mod value;
