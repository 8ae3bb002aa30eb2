use super::SessionError;
use crate::config::SessionConfig;
use crate::history::RingBuffer;
use hoverlink_common::protocol::{
    DockCorner, DockSize, Interaction, NetworkRequest, OverlayUiUpdate, TabSnapshot,
};
use serde_json::Value;

pub const MIN_DOCK_WIDTH: f64 = 300.0;
pub const MIN_DOCK_HEIGHT: f64 = 260.0;

/// One tab's histories and configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TabState {
    pub interactions: RingBuffer<Interaction>,
    pub requests: RingBuffer<NetworkRequest>,
    pub link_window_ms: f64,
    pub inspect_mode: bool,
    pub dock_open: bool,
    pub dock_corner: DockCorner,
    pub dock_size: Option<DockSize>,
}

impl TabState {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            interactions: RingBuffer::new(config.max_interactions),
            requests: RingBuffer::new(config.max_requests),
            link_window_ms: config.default_link_window_ms,
            inspect_mode: false,
            dock_open: false,
            dock_corner: DockCorner::default(),
            dock_size: None,
        }
    }

    /// Rebuilds state from a persisted record. Every field is validated on its own, so a
    /// corrupt field falls back to its default without discarding the rest.
    pub fn restore(stored: &Value, config: &SessionConfig) -> Self {
        let mut state = Self::new(config);

        if let Some(items) = stored.get("interactions").and_then(Value::as_array) {
            state.interactions = RingBuffer::from_iter_bounded(
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok()),
                config.max_interactions,
            );
        }
        if let Some(items) = stored.get("requests").and_then(Value::as_array) {
            state.requests = RingBuffer::from_iter_bounded(
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok()),
                config.max_requests,
            );
        }
        if let Some(ms) = stored.get("linkWindowMs").and_then(parse_link_window) {
            state.link_window_ms = ms;
        }
        if let Some(enabled) = stored.get("inspectMode").and_then(Value::as_bool) {
            state.inspect_mode = enabled;
        }
        if let Some(open) = stored.get("dockOpen").and_then(Value::as_bool) {
            state.dock_open = open;
        }
        if let Some(corner) = stored.get("dockCorner").and_then(parse_dock_corner) {
            state.dock_corner = corner;
        }
        state.dock_size = stored.get("dockSize").and_then(parse_dock_size);

        state
    }

    pub fn snapshot(&self) -> TabSnapshot {
        TabSnapshot {
            interactions: self.interactions.to_vec(),
            requests: self.requests.to_vec(),
            link_window_ms: self.link_window_ms,
            inspect_mode: self.inspect_mode,
            dock_open: self.dock_open,
            dock_corner: self.dock_corner,
            dock_size: self.dock_size,
        }
    }

    pub fn set_link_window(&mut self, ms: f64) -> Result<(), SessionError> {
        if !is_valid_link_window(ms) {
            return Err(SessionError::InvalidLinkWindow(ms.to_string()));
        }
        self.link_window_ms = ms;
        Ok(())
    }

    /// Absent fields are left alone, invalid ones ignored; an explicit null size clears it.
    pub fn apply_overlay_update(&mut self, update: &OverlayUiUpdate) {
        if let Some(open) = update.dock_open.as_ref().and_then(Value::as_bool) {
            self.dock_open = open;
        }
        if let Some(corner) = update.dock_corner.as_ref().and_then(parse_dock_corner) {
            self.dock_corner = corner;
        }
        match &update.dock_size {
            Some(Value::Null) => self.dock_size = None,
            Some(value) => {
                if let Some(size) = parse_dock_size(value) {
                    self.dock_size = Some(size);
                }
            }
            None => {}
        }
    }

    /// Empties both histories; configuration is kept.
    pub fn clear_history(&mut self) {
        self.interactions.clear();
        self.requests.clear();
    }
}

pub fn is_valid_link_window(ms: f64) -> bool {
    ms.is_finite() && ms >= 0.0
}

pub fn parse_link_window(value: &Value) -> Option<f64> {
    value.as_f64().filter(|ms| is_valid_link_window(*ms))
}

pub fn parse_dock_corner(value: &Value) -> Option<DockCorner> {
    serde_json::from_value(value.clone()).ok()
}

/// Accepts `{width, height}` with finite numbers, rounded and clamped to the minimum dock size.
pub fn parse_dock_size(value: &Value) -> Option<DockSize> {
    let width = value.get("width")?.as_f64().filter(|w| w.is_finite())?;
    let height = value.get("height")?.as_f64().filter(|h| h.is_finite())?;
    Some(DockSize {
        width: width.round().max(MIN_DOCK_WIDTH),
        height: height.round().max(MIN_DOCK_HEIGHT),
    })
}

/// JavaScript truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
