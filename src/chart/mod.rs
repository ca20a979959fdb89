//! Diagram link generation for chhart.app.
//!
//! - [`codec`]: reversible text to URL-safe token transform
//! - [`link`]: share-link composition and Sankey source rendering
//! - [`syntax`]: the DSL reference handed to clients

pub mod codec;
pub mod link;
pub mod syntax;

pub use codec::{decode, encode};
pub use link::{
    build_link, js_number, sankey_source, DiagramKind, Flow, LinkBuilder, DEFAULT_ORIGIN,
};
pub use syntax::SyntaxTopic;
