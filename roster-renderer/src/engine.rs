//! Tera rendering engine for the snapshot page.
//!
//! The embedded template is baked into the binary with `include_str!`. A user
//! template file replaces it wholesale; it sees the same [`PageContext`].
//! The template is registered under an `.html` name so tera autoescapes every
//! interpolated value.

use std::path::{Path, PathBuf};

use tera::Tera;

use roster_core::types::Snapshot;

use crate::context::PageContext;
use crate::error::RenderError;

/// Name the page template is registered under.
pub const PAGE_TEMPLATE: &str = "index.html";

const EMBEDDED_PAGE: &str = include_str!("templates/index.html.tera");

/// Source of the built-in page template, as a starting point for overrides.
pub fn embedded_template() -> &'static str {
    EMBEDDED_PAGE
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn build_tera(user_template: Option<&Path>) -> Result<Tera, RenderError> {
    let page = match user_template {
        Some(path) => std::fs::read_to_string(path).map_err(|e| io_err(path, e))?,
        None => EMBEDDED_PAGE.to_string(),
    };
    let mut tera = Tera::default();
    tera.add_raw_template(PAGE_TEMPLATE, &page)?;
    Ok(tera)
}

/// Page renderer. Create once and reuse.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Construct a [`Renderer`] with the embedded template.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_template(None)
    }

    /// Construct a [`Renderer`], replacing the embedded template with
    /// `user_template` when given.
    pub fn with_template(user_template: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Renderer {
            tera: build_tera(user_template)?,
        })
    }

    /// Render the page for `snapshot`.
    pub fn render(&self, snapshot: &Snapshot) -> Result<String, RenderError> {
        self.render_with_context(&PageContext::from_snapshot(snapshot))
    }

    /// Render the page from a caller-provided [`PageContext`].
    pub fn render_with_context(&self, ctx: &PageContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        let html = self.tera.render(PAGE_TEMPLATE, &tera_ctx)?;
        Ok(html.replace("\r\n", "\n"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::types::{Etag, Group, GroupId, Member, MemberEntry, UserId};

    fn snapshot(description: &str) -> Snapshot {
        Snapshot {
            domain: "example.com".to_string(),
            groups: vec![Group {
                id: GroupId::from("g1"),
                etag: Etag::from("e1"),
                email: "eng@example.com".to_string(),
                name: "Engineering".to_string(),
                description: description.to_string(),
                members: vec![MemberEntry::Unresolved(Member {
                    id: UserId::from("u1"),
                    etag: Etag::from("m1"),
                    email: Some("ada@example.com".to_string()),
                    role: "OWNER".to_string(),
                    member_type: None,
                    status: None,
                })],
            }],
        }
    }

    #[test]
    fn renderer_new_succeeds() {
        Renderer::new().expect("Renderer::new should succeed with the embedded template");
    }

    #[test]
    fn page_lists_groups_and_members() {
        let html = Renderer::new().unwrap().render(&snapshot("Builds things")).unwrap();
        assert!(html.contains("<h1>example.com</h1>"));
        assert!(html.contains("Engineering"));
        assert!(html.contains("Builds things"));
        assert!(html.contains("mailto:eng@example.com"));
        assert!(html.contains("<span>ada@example.com</span>"));
        assert!(html.contains("class=\"unresolved\""));
    }

    #[test]
    fn interpolated_values_are_escaped() {
        let html = Renderer::new()
            .unwrap()
            .render(&snapshot("<script>alert(1)</script>"))
            .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer = Renderer::new().unwrap();
        let snap = snapshot("same");
        assert_eq!(renderer.render(&snap).unwrap(), renderer.render(&snap).unwrap());
    }

    #[test]
    fn user_template_replaces_embedded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "{{ domain }}:{% for g in groups %}{{ g.id }}{% endfor %}").unwrap();
        let html = Renderer::with_template(Some(&path))
            .unwrap()
            .render(&snapshot(""))
            .unwrap();
        assert_eq!(html, "example.com:g1");
    }

    #[test]
    fn missing_user_template_is_io_error() {
        let err = Renderer::with_template(Some(Path::new("/nonexistent/page.html")))
            .err()
            .expect("missing template must fail");
        assert!(matches!(err, RenderError::Io { .. }));
    }
}
