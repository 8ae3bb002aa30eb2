use crate::dom::{ElementPath, Rect};
use crate::error::ProtocolError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub type TabId = i64;

/// Keeps an explicit `null` distinguishable from an absent field.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// Heuristic identity of "the same logical element" across interactions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementKey(String);

impl ElementKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Descriptive snapshot of an element. Never used as a lookup key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMeta {
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Click,
    Submit,
    Enter,
}

impl InteractionKind {
    /// Only the Enter key counts as an interaction; other keys are ignored.
    pub fn from_key(key: &str) -> Option<Self> {
        (key == "Enter").then_some(InteractionKind::Enter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub element_key: ElementKey,
    pub element_meta: ElementMeta,
}

/// A completed network call. `status == 0` means the request failed below HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub id: String,
    pub ts_start: i64,
    pub ts_end: i64,
    pub method: String,
    pub url: String,
    pub status: u16,
}

impl NetworkRequest {
    pub fn is_network_failure(&self) -> bool {
        self.status == 0
    }

    pub fn duration_ms(&self) -> i64 {
        self.ts_end - self.ts_start
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DockCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DockSize {
    pub width: f64,
    pub height: f64,
}

/// The per-tab record as it is persisted and handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub interactions: Vec<Interaction>,
    pub requests: Vec<NetworkRequest>,
    pub link_window_ms: f64,
    pub inspect_mode: bool,
    pub dock_open: bool,
    pub dock_corner: DockCorner,
    pub dock_size: Option<DockSize>,
}

/// Messages sent by the capture and presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum HoverMessage {
    GetTabState,
    StoreInteraction(Interaction),
    CaptureInteraction(CaptureInteractionRequest),
    StoreRequest(NetworkRequest),
    SetLinkWindow(SetLinkWindowRequest),
    SetInspect(SetInspectRequest),
    SetOverlayUi(OverlayUiUpdate),
    ClearTabState,
    Hover(HoverRequest),
    LinkedRequests,
    TabRemoved,
}

/// A raw DOM event; the engine resolves the target and builds the interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureInteractionRequest {
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub target: ElementPath,
}

/// Values stay loosely typed so that a wrong type is rejected, not a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLinkWindowRequest {
    #[serde(default)]
    pub link_window_ms: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetInspectRequest {
    #[serde(default)]
    pub enabled: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayUiUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dock_open: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dock_corner: Option<serde_json::Value>,
    /// `Some(Value::Null)` clears the stored size, `None` leaves it untouched.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub dock_size: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoverRequest {
    pub target: ElementPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    pub message: HoverMessage,
}

impl Envelope {
    pub fn new(tab_id: TabId, message: HoverMessage) -> Self {
        Self {
            request_id: None,
            tab_id: Some(tab_id),
            message,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn require_tab(&self) -> Result<TabId, ProtocolError> {
        self.tab_id.ok_or(ProtocolError::MissingTabId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }

    pub fn rejected() -> Self {
        Self { ok: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoveredElement {
    pub element_key: ElementKey,
    pub element_meta: ElementMeta,
    /// Newest first, capped to the tooltip limit.
    pub requests: Vec<NetworkRequest>,
    pub total_linked: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoverResult {
    pub hovered: Option<HoveredElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRequests {
    pub element_key: ElementKey,
    pub requests: Vec<NetworkRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedRequests {
    pub groups: Vec<ElementRequests>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HoverResponse {
    State(Box<TabSnapshot>),
    Linked(LinkedRequests),
    Ack(Ack),
    Hover(HoverResult),
}

impl HoverResponse {
    pub fn ok() -> Self {
        HoverResponse::Ack(Ack::ok())
    }

    pub fn rejected() -> Self {
        HoverResponse::Ack(Ack::rejected())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub response: HoverResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interaction_uses_extension_field_names() {
        let value = json!({
            "id": "interaction_1",
            "ts": 1000,
            "type": "click",
            "elementKey": "id:save",
            "elementMeta": {"tagName": "button", "id": "save"}
        });
        let interaction: Interaction = serde_json::from_value(value).unwrap();
        assert_eq!(interaction.timestamp, 1000);
        assert_eq!(interaction.kind, InteractionKind::Click);
        assert_eq!(interaction.element_key.as_str(), "id:save");
        assert_eq!(interaction.element_meta.id.as_deref(), Some("save"));
    }

    #[test]
    fn test_unit_messages_need_no_payload() {
        let env = Envelope::from_json(r#"{"tabId": 7, "message": {"type": "clear-tab-state"}}"#)
            .unwrap();
        assert_eq!(env.tab_id, Some(7));
        assert!(matches!(env.message, HoverMessage::ClearTabState));
    }

    #[test]
    fn test_overlay_update_keeps_explicit_null() {
        let update: OverlayUiUpdate = serde_json::from_value(json!({"dockSize": null})).unwrap();
        assert_eq!(update.dock_size, Some(serde_json::Value::Null));

        let update: OverlayUiUpdate = serde_json::from_value(json!({"dockOpen": true})).unwrap();
        assert!(update.dock_size.is_none());
    }

    #[test]
    fn test_missing_tab_id() {
        let env = Envelope::from_json(r#"{"message": {"type": "get-tab-state"}}"#).unwrap();
        assert!(matches!(env.require_tab(), Err(ProtocolError::MissingTabId)));
    }

    #[test]
    fn test_enter_is_the_only_key_interaction() {
        assert_eq!(InteractionKind::from_key("Enter"), Some(InteractionKind::Enter));
        assert_eq!(InteractionKind::from_key("Tab"), None);
    }

    #[test]
    fn test_ack_serializes_as_ok_flag() {
        let text = serde_json::to_string(&HoverResponse::rejected()).unwrap();
        assert_eq!(text, r#"{"ok":false}"#);
    }
}
