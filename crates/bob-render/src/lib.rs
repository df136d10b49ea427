//! Bob Render
//!
//! Two-pass rendering of text artifacts. The first pass renders the whole
//! template with minijinja; the second re-extracts the `---` delimited
//! header from the result and validates it as YAML, so substitutions inside
//! the header can never leave it unparseable.

mod artifact;
mod error;
mod renderer;
pub mod rules;

pub use artifact::RenderedArtifact;
pub use error::RenderError;
pub use renderer::{TemplateRenderer, validate_header};
