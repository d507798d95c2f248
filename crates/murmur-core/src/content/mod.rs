//! Content admission (sanitize, normalize, classify).
//!
//! The validator is a pure function of its input and options: identical
//! drafts always produce identical results. The only entry point callers on
//! the write path should use is [`admit`], which runs markup sanitization
//! before the validator pipeline.

pub mod normalize;
pub mod sanitize;
pub mod validator;

pub use normalize::normalize;
pub use sanitize::strip_markup;
pub use validator::{admit, validate, ValidationOptions, ValidationResult};
