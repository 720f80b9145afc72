//! Structured provider output for the analysis core.
//!
//! Provider responses are dynamic JSON. This module turns them into a typed
//! [`AnalysisReport`] through an explicit validation step:
//! - [`Field`]: distinguishes an absent key, an explicit `null` and a value
//! - [`ObjectReader`]: typed accessors with key aliases and path tracking
//! - [`ValidationError`]: names the offending field; converts into
//!   [`crate::Error::Validation`]
//!
//! # Examples
//!
//! ```
//! use ai_analysis_core::structured::AnalysisReport;
//! use serde_json::json;
//!
//! let payload = json!({
//!     "product": {"name": "Oat Bar"},
//!     "nutritional_information": {"per_100g": {"protein": "9 g"}},
//!     "confidence_score": 0.9
//! });
//!
//! let report = AnalysisReport::from_provider_json(&payload).unwrap();
//! assert_eq!(report.product_name(), Some("Oat Bar"));
//! assert_eq!(report.nutritional_information["per_100g"].protein, Some(9.0));
//! ```

pub mod error;
pub mod field;
pub mod report;

pub use error::{ValidationError, ValidationResult};
pub use field::{parse_quantity, Field, ObjectReader};
pub use report::{
    AnalysisReport, GeneralRating, IdentifiedAdditives, NutritionalEvaluation, PortionInfo,
    ProductClassification, ProductInfo, ProfileRating, Recommendations, DEFAULT_CONFIDENCE,
};
