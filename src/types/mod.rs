//! 类型模块：分析请求的内容项、分析类型与个性化参数。
//!
//! # Types Module
//!
//! Request-side types shared by the fingerprint, cache key, provider and
//! orchestrator layers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ContentItem`] | One uploaded payload (bytes + media type) |
//! | [`AnalysisVariant`] | Kind of analysis (`complete`, `nutrition`, `ingredients`) |
//! | [`AnalysisParams`] | Variant plus canonicalized personalization map |
//!
//! ## Example
//!
//! ```rust
//! use ai_analysis_core::types::{AnalysisParams, AnalysisVariant, ContentItem};
//!
//! let item = ContentItem::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg");
//! let params = AnalysisParams::new(AnalysisVariant::Nutrition)
//!     .with_dietary_preferences(["vegan"])
//!     .with_language("en");
//! assert_eq!(params.language(), Some("en"));
//! assert!(!item.is_empty());
//! ```

pub mod content;
pub mod params;

pub use content::ContentItem;
pub use params::{
    AnalysisParams, AnalysisVariant, DEFAULT_PARAMS_DIGEST, PARAM_CONTENT_LANGUAGE,
    PARAM_DIETARY_PREFERENCES, PARAM_HEALTH_CONDITIONS, PARAM_USER_PROFILE,
};
