//! Domain models and types for Meridian.
//!
//! This module contains the inputs the converter works on: the Web Template
//! schema model, the context bag, RM type tags, identifiers and the error
//! hierarchy.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Schema model** ([`WebTemplate`], [`WebTemplateNode`], [`WebTemplateInput`])
//! - **RM type tags** ([`RmType`])
//! - **Context bag** ([`ContextBag`])
//! - **Identifiers** ([`ObjectVersionId`], [`LocatableUid`], [`TemplateId`])
//! - **Error types** ([`MeridianError`], [`ConversionError`])
//! - **Result type aliases** ([`Result`], [`ConversionResult`])
//!
//! # Error Handling
//!
//! Library entry points outside the conversion core return [`Result<T, MeridianError>`];
//! conversion errors convert into it with the `?` operator:
//!
//! ```rust
//! use meridian::domain::{ConversionError, Result};
//!
//! fn example() -> Result<()> {
//!     let failed: std::result::Result<(), ConversionError> =
//!         Err(ConversionError::InvalidSchema("empty".to_string()));
//!     failed?;
//!     Ok(())
//! }
//! assert!(example().is_err());
//! ```

pub mod context;
pub mod errors;
pub mod ids;
pub mod result;
pub mod rm_type;
pub mod template;

// Re-export commonly used types for convenience
pub use context::{ContextBag, FacilitySpec, IsmOverride, LinkSpec, ObjectRefSpec};
pub use errors::{ConversionError, ConversionResult, MeridianError};
pub use ids::{LocatableUid, ObjectVersionId, TemplateId};
pub use result::Result;
pub use rm_type::RmType;
pub use template::{WebTemplate, WebTemplateInput, WebTemplateInputValue, WebTemplateNode};
