use crate::capture::{capture_interaction, now_ms};
use crate::identity::PathCursor;
use crate::session::TabSessions;
use crate::session::state::is_truthy;
use hoverlink_common::protocol::{
    Envelope, HoverMessage, HoverResponse, HoverResult, LinkedRequests, Reply, TabId,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes messages from the capture and presentation layers into [`TabSessions`].
///
/// Never fails: rejected or malformed input is answered with `{ "ok": false }`.
#[derive(Clone)]
pub struct Dispatcher {
    sessions: Arc<TabSessions>,
}

impl Dispatcher {
    pub fn new(sessions: Arc<TabSessions>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &Arc<TabSessions> {
        &self.sessions
    }

    pub async fn dispatch_text(&self, text: &str) -> Reply {
        match Envelope::from_json(text) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => {
                warn!("{}", e);
                Reply {
                    request_id: None,
                    response: HoverResponse::rejected(),
                }
            }
        }
    }

    pub async fn dispatch(&self, envelope: Envelope) -> Reply {
        let request_id = envelope.request_id;
        let response = match envelope.require_tab() {
            Ok(tab_id) => self.handle(tab_id, envelope.message).await,
            Err(e) => {
                debug!("{}", e);
                HoverResponse::rejected()
            }
        };
        Reply {
            request_id,
            response,
        }
    }

    pub async fn handle(&self, tab_id: TabId, message: HoverMessage) -> HoverResponse {
        let sessions = &self.sessions;
        match message {
            HoverMessage::GetTabState => {
                HoverResponse::State(Box::new(sessions.get_state(tab_id).await))
            }
            HoverMessage::StoreInteraction(interaction) => {
                sessions.record_interaction(tab_id, interaction).await;
                HoverResponse::ok()
            }
            HoverMessage::CaptureInteraction(capture) => {
                let Some(cursor) = PathCursor::new(&capture.target) else {
                    return HoverResponse::rejected();
                };
                let timestamp = capture.ts.unwrap_or_else(now_ms);
                let interaction = capture_interaction(capture.kind, timestamp, &cursor);
                sessions.record_interaction(tab_id, interaction).await;
                HoverResponse::ok()
            }
            HoverMessage::StoreRequest(request) => {
                sessions.record_request(tab_id, request).await;
                HoverResponse::ok()
            }
            HoverMessage::SetLinkWindow(update) => {
                let Some(ms) = update.link_window_ms.as_ref().and_then(Value::as_f64) else {
                    return HoverResponse::rejected();
                };
                match sessions.set_link_window(tab_id, ms).await {
                    Ok(()) => HoverResponse::ok(),
                    Err(_) => HoverResponse::rejected(),
                }
            }
            HoverMessage::SetInspect(update) => {
                let enabled = update.enabled.as_ref().is_some_and(is_truthy);
                sessions.set_inspect_mode(tab_id, enabled).await;
                HoverResponse::ok()
            }
            HoverMessage::SetOverlayUi(update) => {
                sessions.set_overlay_ui(tab_id, &update).await;
                HoverResponse::ok()
            }
            HoverMessage::ClearTabState => {
                sessions.clear_history(tab_id).await;
                HoverResponse::ok()
            }
            HoverMessage::Hover(hover) => HoverResponse::Hover(HoverResult {
                hovered: sessions.hover(tab_id, &hover.target, hover.rect).await,
            }),
            HoverMessage::LinkedRequests => HoverResponse::Linked(LinkedRequests {
                groups: sessions.linked_requests(tab_id).await,
            }),
            HoverMessage::TabRemoved => {
                sessions.drop_tab(tab_id).await;
                HoverResponse::ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;

    fn dispatcher() -> Dispatcher {
        let store = Arc::new(MemoryStore::new());
        Dispatcher::new(Arc::new(TabSessions::with_store(store)))
    }

    #[tokio::test]
    async fn test_missing_tab_is_rejected() {
        let reply = dispatcher()
            .dispatch_text(r#"{"requestId": 4, "message": {"type": "get-tab-state"}}"#)
            .await;
        assert_eq!(reply.request_id, Some(4));
        assert_eq!(reply.response, HoverResponse::rejected());
    }

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        let reply = dispatcher().dispatch_text("not json").await;
        assert_eq!(reply.response, HoverResponse::rejected());
    }

    #[tokio::test]
    async fn test_link_window_must_be_a_number() {
        let d = dispatcher();
        let reply = d
            .dispatch_text(
                r#"{"tabId": 1, "message": {"type": "set-link-window", "payload": {"linkWindowMs": "fast"}}}"#,
            )
            .await;
        assert_eq!(reply.response, HoverResponse::rejected());
        assert_eq!(d.sessions().get_state(1).await.link_window_ms, 1500.0);
    }

    #[tokio::test]
    async fn test_store_request_uppercases_method() {
        let d = dispatcher();
        let reply = d
            .dispatch_text(
                r#"{"tabId": 2, "message": {"type": "store-request", "payload":
                    {"id": "r1", "tsStart": 1, "tsEnd": 2, "method": "patch", "url": "/x", "status": 204}}}"#,
            )
            .await;
        assert_eq!(reply.response, HoverResponse::ok());
        assert_eq!(d.sessions().get_state(2).await.requests[0].method, "PATCH");
    }
}
