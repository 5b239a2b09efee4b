//! Request building module
//!
//! Turns `-d`, `-F`, `-H` and friends into [`PreparedRequest`]s.

mod data;
mod factory;
mod form;

pub use data::{DataSources, FORM_URL_ENCODED};
pub use factory::{origin_authority, BodySource, PreparedRequest, RequestFactory, DEFAULT_USER_AGENT};
pub use form::{FormField, FormFields};
