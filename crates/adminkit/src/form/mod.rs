//! Form building blocks shared by settings pages and metaboxes.
//!
//! - Typed input fields with storage keys and submit semantics
//! - CSRF token generation and verification

pub mod csrf;
mod field;

pub use csrf::{CsrfIssuer, CsrfTokens, CsrfVerifier, TOKEN_FIELD};
pub use field::{CheckboxAbsence, FieldError, FieldKind, FieldWrite, FormError, InputField};
