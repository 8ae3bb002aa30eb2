//! Helpers for the capture layer: building interactions from DOM events and requests
//! from instrumented fetch/XHR calls.

use crate::identity::{self, DomElement};
use hoverlink_common::protocol::{Interaction, InteractionKind, NetworkRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Opaque, process-unique id of the form `<prefix>_<ms>_<hex>`.
pub fn create_id(prefix: &str) -> String {
    let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{:x}", prefix, now_ms(), n)
}

/// Builds an interaction for the interactive target nearest to `element`.
pub fn capture_interaction<E: DomElement + Clone>(
    kind: InteractionKind,
    timestamp: i64,
    element: &E,
) -> Interaction {
    let target = identity::resolve_target(element);
    let (element_key, element_meta) = identity::resolve_identity(&target);
    Interaction {
        id: create_id("interaction"),
        timestamp,
        kind,
        element_key,
        element_meta,
    }
}

/// A request that has been dispatched but has not completed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub id: String,
    pub ts_start: i64,
    pub method: String,
    pub url: String,
}

impl PendingRequest {
    pub fn begin(method: &str, url: impl Into<String>, ts_start: i64) -> Self {
        let method = method.trim();
        Self {
            id: create_id("request"),
            ts_start,
            method: if method.is_empty() {
                "GET".to_string()
            } else {
                method.to_uppercase()
            },
            url: url.into(),
        }
    }

    pub fn complete(self, status: u16, ts_end: i64) -> NetworkRequest {
        NetworkRequest {
            id: self.id,
            ts_start: self.ts_start,
            ts_end,
            method: self.method,
            url: self.url,
            status,
        }
    }

    /// Network-level failure; recorded with status 0.
    pub fn fail(self, ts_end: i64) -> NetworkRequest {
        self.complete(0, ts_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PathCursor;
    use hoverlink_common::dom::{DomNode, ElementPath};

    #[test]
    fn test_ids_are_unique() {
        let a = create_id("interaction");
        let b = create_id("interaction");
        assert_ne!(a, b);
        assert!(a.starts_with("interaction_"));
    }

    #[test]
    fn test_pending_request_normalizes_method() {
        let request = PendingRequest::begin("post", "/api/save", 100).complete(201, 180);
        assert_eq!(request.method, "POST");
        assert_eq!(request.status, 201);
        assert_eq!(request.duration_ms(), 80);

        let request = PendingRequest::begin("", "/api", 100).fail(120);
        assert_eq!(request.method, "GET");
        assert!(request.is_network_failure());
    }

    #[test]
    fn test_capture_resolves_interactive_target() {
        let path = ElementPath::new(vec![
            DomNode::new("svg"),
            DomNode::new("button").with_attr("aria-label", "Close"),
        ]);
        let cursor = PathCursor::new(&path).unwrap();
        let interaction = capture_interaction(InteractionKind::Click, 5, &cursor);
        assert_eq!(interaction.element_key.as_str(), "aria-label:Close");
        assert_eq!(interaction.element_meta.tag_name, "button");
        assert_eq!(interaction.timestamp, 5);
    }
}
