//! Serialized DOM fragments.
//!
//! The capture layer cannot hand a live element across the extension boundary,
//! so it sends the element together with its ancestor chain. Index 0 is the
//! element itself, the last node is the outermost ancestor that was captured.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Attributes arrive with null values for attributes the page does not set.
fn deserialize_nullable_string_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: HashMap<String, Option<String>> = HashMap::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.map(|val| (k, val)))
        .collect())
}

fn default_position() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub tag_name: String,
    #[serde(default, deserialize_with = "deserialize_nullable_string_map")]
    pub attributes: HashMap<String, String>,
    /// `None` when the page exposes something other than a plain string
    /// (SVG elements carry an `SVGAnimatedString`).
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub text_content: Option<String>,
    /// 1-based position among parent children sharing this tag.
    #[serde(default = "default_position")]
    pub same_tag_index: usize,
    #[serde(default = "default_position")]
    pub same_tag_count: usize,
}

impl DomNode {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: HashMap::new(),
            class_name: None,
            text_content: None,
            same_tag_index: 1,
            same_tag_count: 1,
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text_content = Some(text.to_string());
        self
    }

    pub fn with_position(mut self, index: usize, count: usize) -> Self {
        self.same_tag_index = index;
        self.same_tag_count = count;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementPath {
    pub nodes: Vec<DomNode>,
}

impl ElementPath {
    pub fn new(nodes: Vec<DomNode>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_attributes_are_dropped() {
        let json = r#"{
            "tagName": "BUTTON",
            "attributes": {"data-testid": "save", "aria-label": null},
            "className": null
        }"#;
        let node: DomNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.attributes.get("data-testid").map(String::as_str), Some("save"));
        assert!(!node.attributes.contains_key("aria-label"));
        assert_eq!(node.same_tag_index, 1);
        assert_eq!(node.same_tag_count, 1);
        assert!(node.class_name.is_none());
    }
}
