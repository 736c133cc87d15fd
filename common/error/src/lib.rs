//! Shared error classification for the `cofiber` workspace.
//!
//! Every typed error enum in this workspace implements [`ErrorExt`] and
//! tags itself with a [`StatusCode`], so callers outside the crate that
//! produced an error can decide whether to retry or log it without
//! depending on `Display` text.

mod ext;
mod status_code;

pub use ext::BoxedError;
pub use ext::ErrorExt;
pub use ext::PlainError;
pub use ext::boxed;
pub use status_code::StatusCategory;
pub use status_code::StatusCode;
pub use status_code::StatusMeta;
