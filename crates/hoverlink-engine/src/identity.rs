//! Element identity resolution.
//!
//! Derives a stable [`ElementKey`] and a descriptive [`ElementMeta`] for a DOM element.
//! The key groups requests under "the same logical element" across re-renders, so stable
//! test/accessibility attributes win over structural position.
//!
//! Key candidates (first non-empty wins, each trimmed and truncated):
//! 1. `data-testid`
//! 2. `aria-label`
//! 3. element id
//! 4. `name`
//! 5. `role` together with text content
//! 6. a CSS path of at most five segments, anchored at the nearest id

use hoverlink_common::dom::{DomNode, ElementPath};
use hoverlink_common::protocol::{ElementKey, ElementMeta};

pub const MAX_VALUE_CHARS: usize = 80;
pub const MAX_KEY_TEXT_CHARS: usize = 60;
pub const MAX_META_CLASSES: usize = 4;
pub const MAX_PATH_CLASSES: usize = 2;
pub const MAX_PATH_SEGMENTS: usize = 5;

const INTERACTIVE_TAGS: &[&str] = &["button", "a", "input", "select", "textarea"];
const INTERACTIVE_ROLES: &[&str] = &[
    "button", "tab", "link", "menuitem", "checkbox", "radio", "switch",
];

/// Position of an element among its parent's children with the same tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingPosition {
    /// 1-based.
    pub index: usize,
    pub count: usize,
}

/// Read-only view of a DOM element.
pub trait DomElement: Sized {
    fn tag_name(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    fn id(&self) -> Option<String> {
        self.attribute("id")
    }

    /// `None` when the class name is not a plain string (SVG elements).
    fn class_name(&self) -> Option<String>;

    fn text_content(&self) -> Option<String>;

    fn parent(&self) -> Option<Self>;

    /// `None` for detached elements or the document root.
    fn same_tag_position(&self) -> Option<SiblingPosition>;
}

/// Cursor into a serialized [`ElementPath`], `depth` levels above the target.
#[derive(Debug, Clone, Copy)]
pub struct PathCursor<'a> {
    path: &'a ElementPath,
    depth: usize,
}

impl<'a> PathCursor<'a> {
    pub fn new(path: &'a ElementPath) -> Option<Self> {
        if path.is_empty() {
            return None;
        }
        Some(Self { path, depth: 0 })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn node(&self) -> &'a DomNode {
        &self.path.nodes[self.depth]
    }
}

impl DomElement for PathCursor<'_> {
    fn tag_name(&self) -> String {
        self.node().tag_name.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.node().attributes.get(name).cloned()
    }

    fn class_name(&self) -> Option<String> {
        self.node().class_name.clone()
    }

    fn text_content(&self) -> Option<String> {
        self.node().text_content.clone()
    }

    fn parent(&self) -> Option<Self> {
        let depth = self.depth + 1;
        (depth < self.path.nodes.len()).then_some(Self {
            path: self.path,
            depth,
        })
    }

    fn same_tag_position(&self) -> Option<SiblingPosition> {
        self.parent()?;
        let node = self.node();
        Some(SiblingPosition {
            index: node.same_tag_index,
            count: node.same_tag_count,
        })
    }
}

/// Trims `value`; empty counts as absent; longer than `max` chars is cut and ends in `…`.
pub fn truncate(value: Option<&str>, max: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > max {
        let mut cut: String = trimmed.chars().take(max).collect();
        cut.push('…');
        Some(cut)
    } else {
        Some(trimmed.to_string())
    }
}

/// Escapes everything outside `[A-Za-z0-9_-]` with a backslash.
pub fn css_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn class_list<E: DomElement>(element: &E) -> Option<Vec<String>> {
    element.class_name().map(|class_name| {
        class_name
            .split_whitespace()
            .map(str::to_string)
            .collect()
    })
}

fn attr<E: DomElement>(element: &E, name: &str, max: usize) -> Option<String> {
    truncate(element.attribute(name).as_deref(), max)
}

/// Best-effort selector for `element`, at most [`MAX_PATH_SEGMENTS`] segments.
pub fn css_path<E: DomElement>(element: &E) -> String {
    let mut parts = Vec::new();
    collect_segments(element, &mut parts);
    parts.reverse();
    parts.join(" > ")
}

fn collect_segments<E: DomElement>(node: &E, parts: &mut Vec<String>) {
    if parts.len() >= MAX_PATH_SEGMENTS {
        return;
    }
    let tag = node.tag_name().to_lowercase();
    if tag.is_empty() {
        return;
    }

    if let Some(id) = node.id().filter(|id| !id.is_empty()) {
        parts.push(format!("{}#{}", tag, css_escape(&id)));
        return;
    }

    let mut selector = tag;
    let classes = class_list(node).unwrap_or_default();
    if !classes.is_empty() {
        let escaped: Vec<String> = classes
            .iter()
            .take(MAX_PATH_CLASSES)
            .map(|c| css_escape(c))
            .collect();
        selector.push('.');
        selector.push_str(&escaped.join("."));
    }

    if let Some(position) = node.same_tag_position()
        && position.count > 1
    {
        selector.push_str(&format!(":nth-of-type({})", position.index));
    }

    parts.push(selector);
    if let Some(parent) = node.parent() {
        collect_segments(&parent, parts);
    }
}

/// Captures every available attribute, independent of which one wins the key.
pub fn element_meta<E: DomElement>(element: &E) -> ElementMeta {
    ElementMeta {
        tag_name: element.tag_name().to_lowercase(),
        id: truncate(element.id().as_deref(), MAX_VALUE_CHARS),
        name: attr(element, "name", MAX_VALUE_CHARS),
        role: attr(element, "role", MAX_VALUE_CHARS),
        aria_label: attr(element, "aria-label", MAX_VALUE_CHARS),
        data_test_id: attr(element, "data-testid", MAX_VALUE_CHARS),
        text: truncate(element.text_content().as_deref(), MAX_VALUE_CHARS),
        classes: class_list(element)
            .map(|classes| classes.into_iter().take(MAX_META_CLASSES).collect()),
        selector: Some(css_path(element)),
    }
}

pub fn build_element_key<E: DomElement>(element: &E) -> ElementKey {
    if let Some(test_id) = attr(element, "data-testid", MAX_VALUE_CHARS) {
        return ElementKey::new(format!("data-testid:{}", test_id));
    }
    if let Some(label) = attr(element, "aria-label", MAX_VALUE_CHARS) {
        return ElementKey::new(format!("aria-label:{}", label));
    }
    if let Some(id) = truncate(element.id().as_deref(), MAX_VALUE_CHARS) {
        return ElementKey::new(format!("id:{}", id));
    }
    if let Some(name) = attr(element, "name", MAX_VALUE_CHARS) {
        return ElementKey::new(format!("name:{}", name));
    }

    let role = attr(element, "role", MAX_VALUE_CHARS);
    let text = truncate(element.text_content().as_deref(), MAX_KEY_TEXT_CHARS);
    if let (Some(role), Some(text)) = (role, text) {
        return ElementKey::new(format!("role:{}|text:{}", role, text));
    }

    let path = css_path(element);
    if path.is_empty() {
        ElementKey::new(format!("css:{}", element.tag_name().to_lowercase()))
    } else {
        ElementKey::new(format!("css:{}", path))
    }
}

pub fn resolve_identity<E: DomElement>(element: &E) -> (ElementKey, ElementMeta) {
    (build_element_key(element), element_meta(element))
}

pub fn is_interactive<E: DomElement>(element: &E) -> bool {
    if element.attribute("data-testid").is_some() || element.attribute("aria-label").is_some() {
        return true;
    }
    let tag = element.tag_name().to_lowercase();
    if INTERACTIVE_TAGS.contains(&tag.as_str()) {
        return true;
    }
    element
        .attribute("role")
        .is_some_and(|role| INTERACTIVE_ROLES.contains(&role.as_str()))
}

/// Closest interactive ancestor-or-self, or the element itself when none is.
pub fn resolve_target<E: DomElement + Clone>(element: &E) -> E {
    let mut current = Some(element.clone());
    while let Some(node) = current {
        if is_interactive(&node) {
            return node;
        }
        current = node.parent();
    }
    element.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(nodes: Vec<DomNode>) -> String {
        let path = ElementPath::new(nodes);
        let cursor = PathCursor::new(&path).unwrap();
        build_element_key(&cursor).as_str().to_string()
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate(None, 5), None);
        assert_eq!(truncate(Some("   "), 5), None);
        assert_eq!(truncate(Some("  ok "), 5).as_deref(), Some("ok"));
        assert_eq!(truncate(Some("abcdefgh"), 5).as_deref(), Some("abcde…"));
    }

    #[test]
    fn test_css_escape() {
        assert_eq!(css_escape("save-btn_1"), "save-btn_1");
        assert_eq!(css_escape("a:b.c"), "a\\:b\\.c");
    }

    #[test]
    fn test_priority_order() {
        let full = DomNode::new("BUTTON")
            .with_attr("data-testid", "primary")
            .with_attr("aria-label", "Save")
            .with_attr("id", "save-btn")
            .with_attr("name", "save")
            .with_attr("role", "button")
            .with_text("Save");
        assert_eq!(key_of(vec![full.clone()]), "data-testid:primary");

        let mut node = full;
        node.attributes.remove("data-testid");
        assert_eq!(key_of(vec![node.clone()]), "aria-label:Save");

        node.attributes.remove("aria-label");
        assert_eq!(key_of(vec![node.clone()]), "id:save-btn");

        node.attributes.insert("id".into(), "".into());
        assert_eq!(key_of(vec![node.clone()]), "name:save");

        node.attributes.remove("name");
        assert_eq!(key_of(vec![node.clone()]), "role:button|text:Save");

        node.attributes.remove("role");
        assert_eq!(key_of(vec![node]), "css:button");
    }

    #[test]
    fn test_blank_attribute_counts_as_absent() {
        let node = DomNode::new("input")
            .with_attr("data-testid", "   ")
            .with_attr("name", "email");
        assert_eq!(key_of(vec![node]), "name:email");
    }

    #[test]
    fn test_role_text_key_uses_shorter_limit() {
        let text = "x".repeat(70);
        let node = DomNode::new("div")
            .with_attr("role", "button")
            .with_text(&text);
        let expected = format!("role:button|text:{}…", "x".repeat(60));
        assert_eq!(key_of(vec![node]), expected);
    }

    #[test]
    fn test_role_without_text_falls_back_to_css() {
        let node = DomNode::new("div").with_attr("role", "button");
        assert_eq!(key_of(vec![node]), "css:div");
    }

    #[test]
    fn test_css_path_stops_at_id_anchor() {
        let nodes = vec![
            DomNode::new("SPAN").with_class("label  primary extra"),
            DomNode::new("LI").with_position(2, 3),
            DomNode::new("UL").with_attr("id", "menu"),
            DomNode::new("BODY"),
        ];
        assert_eq!(
            key_of(nodes),
            "css:ul#menu > li:nth-of-type(2) > span.label.primary"
        );
    }

    #[test]
    fn test_css_path_is_bounded() {
        let nodes: Vec<DomNode> = (0..8).map(|_| DomNode::new("div")).collect();
        let path = ElementPath::new(nodes);
        let cursor = PathCursor::new(&path).unwrap();
        assert_eq!(css_path(&cursor).matches("div").count(), MAX_PATH_SEGMENTS);
    }

    #[test]
    fn test_svg_class_name_is_ignored() {
        let path = ElementPath::new(vec![DomNode::new("svg"), DomNode::new("div")]);
        let cursor = PathCursor::new(&path).unwrap();
        let meta = element_meta(&cursor);
        assert_eq!(meta.classes, None);
        assert_eq!(meta.selector.as_deref(), Some("div > svg"));
    }

    #[test]
    fn test_meta_records_every_attribute() {
        let node = DomNode::new("BUTTON")
            .with_attr("data-testid", "primary")
            .with_attr("aria-label", "Save")
            .with_attr("name", "save")
            .with_class("btn btn-primary big wide extra")
            .with_text("  Save changes  ");
        let path = ElementPath::new(vec![node]);
        let meta = element_meta(&PathCursor::new(&path).unwrap());
        assert_eq!(meta.tag_name, "button");
        assert_eq!(meta.data_test_id.as_deref(), Some("primary"));
        assert_eq!(meta.aria_label.as_deref(), Some("Save"));
        assert_eq!(meta.name.as_deref(), Some("save"));
        assert_eq!(meta.text.as_deref(), Some("Save changes"));
        assert_eq!(meta.classes.as_ref().map(Vec::len), Some(MAX_META_CLASSES));
    }

    #[test]
    fn test_key_is_deterministic() {
        let nodes = vec![
            DomNode::new("a").with_class("nav"),
            DomNode::new("nav").with_position(1, 2),
        ];
        assert_eq!(key_of(nodes.clone()), key_of(nodes));
    }

    #[test]
    fn test_resolve_target_climbs_to_interactive_ancestor() {
        let path = ElementPath::new(vec![
            DomNode::new("span").with_text("Save"),
            DomNode::new("button").with_attr("id", "save"),
            DomNode::new("form"),
        ]);
        let cursor = PathCursor::new(&path).unwrap();
        let target = resolve_target(&cursor);
        assert_eq!(target.depth(), 1);
        assert_eq!(build_element_key(&target).as_str(), "id:save");
    }

    #[test]
    fn test_resolve_target_falls_back_to_self() {
        let path = ElementPath::new(vec![DomNode::new("span"), DomNode::new("div")]);
        let cursor = PathCursor::new(&path).unwrap();
        assert_eq!(resolve_target(&cursor).depth(), 0);
    }
}
