use std::collections::BTreeMap;

use roster_core::types::{
    Etag, Group, GroupId, Member, MemberEntry, Snapshot, User, UserId, UserName,
};
use roster_renderer::{embedded_template, PageContext, Renderer};

fn group(id: &str, name: &str, members: Vec<MemberEntry>) -> Group {
    Group {
        id: GroupId::from(id),
        etag: Etag::from("e"),
        email: format!("{id}@example.com"),
        name: name.to_string(),
        description: String::new(),
        members,
    }
}

fn snapshot() -> Snapshot {
    let ada = MemberEntry::Resolved(User {
        id: UserId::from("u1"),
        etag: Etag::from("v1"),
        primary_email: "ada@example.com".to_string(),
        name: UserName {
            full_name: "Ada Lovelace".to_string(),
            ..UserName::default()
        },
        thumbnail_photo_url: Some("https://example.com/ada.png".to_string()),
        extra: BTreeMap::new(),
    });
    let partner = MemberEntry::Unresolved(Member {
        id: UserId::from("x9"),
        etag: Etag::from("m9"),
        email: Some("zed@partner.org".to_string()),
        role: "MANAGER".to_string(),
        member_type: Some("USER".to_string()),
        status: None,
    });
    Snapshot {
        domain: "example.com".to_string(),
        groups: vec![
            group("zeta", "Zeta Team", vec![ada, partner]),
            group("alpha", "Alpha Team", Vec::new()),
        ],
    }
}

#[test]
fn page_follows_snapshot_order() {
    let html = Renderer::new().expect("renderer").render(&snapshot()).expect("render");
    let zeta = html.find("<h2>Zeta Team</h2>").expect("zeta section");
    let alpha = html.find("<h2>Alpha Team</h2>").expect("alpha section");
    assert!(zeta < alpha, "groups keep snapshot order, not name order");
}

#[test]
fn resolved_and_unresolved_members_render_differently() {
    let html = Renderer::new().expect("renderer").render(&snapshot()).expect("render");
    assert!(html.contains("<span>Ada Lovelace</span>"));
    assert!(html.contains("<img src="));
    assert!(html.contains("mailto:ada@example.com"));
    assert!(html.contains("<li class=\"unresolved\">"));
    assert!(html.contains("<span class=\"role\">MANAGER</span>"));
}

#[test]
fn empty_group_says_so() {
    let html = Renderer::new().expect("renderer").render(&snapshot()).expect("render");
    assert!(html.contains("No members."));
    assert!(html.contains("2 groups, 2 memberships."));
}

#[test]
fn embedded_template_is_usable_as_override() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("page.html.tera");
    std::fs::write(&path, embedded_template()).expect("write template");

    let snap = snapshot();
    let from_file = Renderer::with_template(Some(&path))
        .expect("renderer")
        .render(&snap)
        .expect("render");
    let built_in = Renderer::new().expect("renderer").render(&snap).expect("render");
    assert_eq!(from_file, built_in);
}

#[test]
fn context_serializes_for_custom_templates() {
    let ctx = PageContext::from_snapshot(&snapshot());
    let json = serde_json::to_value(&ctx).expect("serialize");
    assert_eq!(json["groups"][0]["members"][1]["resolved"], false);
    assert_eq!(json["meta"]["member_count"], 2);
}
