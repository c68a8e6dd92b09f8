//! # roster-renderer
//!
//! Tera-based renderer that turns a directory [`Snapshot`] into a static HTML
//! page.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roster_renderer::Renderer;
//! use roster_core::types::Snapshot;
//!
//! fn page(snapshot: &Snapshot) -> Option<String> {
//!     Renderer::new().ok()?.render(snapshot).ok()
//! }
//! ```
//!
//! [`Snapshot`]: roster_core::types::Snapshot

pub mod context;
pub mod engine;
pub mod error;

pub use context::PageContext;
pub use engine::{embedded_template, Renderer, PAGE_TEMPLATE};
pub use error::RenderError;
