//! Per-tab session state.
//!
//! [`TabSessions`] is the single source of truth for every tab's interaction and request
//! history plus its configuration. Entries are created lazily on first access (restored
//! from the [`SessionStore`] when a record exists) and removed when the tab closes.
//!
//! All store traffic goes through one [`Persister`] queue. Writes and removals are queued
//! while the tab map is locked, so the store sees them in the order the state changed.
//! Restores are queued the same way but awaited after the lock is released, so a slow
//! store never blocks tabs that are already in memory.

pub mod persister;
pub mod state;
pub mod store;

pub use persister::Persister;
pub use state::TabState;
pub use store::{FileStore, MemoryStore, SessionStore, StoreError, storage_key};

use crate::config::{OverlayConfig, SessionConfig};
use crate::correlation::ElementRequestIndex;
use crate::identity::{self, PathCursor};
use hoverlink_common::dom::{ElementPath, Rect};
use hoverlink_common::protocol::{
    ElementRequests, HoveredElement, Interaction, NetworkRequest, OverlayUiUpdate, TabId,
    TabSnapshot,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid link window: {0}")]
    InvalidLinkWindow(String),
}

#[derive(Default)]
struct Tabs {
    states: HashMap<TabId, TabState>,
    /// Bumped by every [`TabSessions::drop_tab`]; a restore started before a drop is stale.
    drops: u64,
}

pub struct TabSessions {
    tabs: Mutex<Tabs>,
    persister: Persister,
    session_config: SessionConfig,
    overlay_config: OverlayConfig,
}

impl TabSessions {
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn SessionStore>,
        session_config: SessionConfig,
        overlay_config: OverlayConfig,
    ) -> Self {
        Self {
            tabs: Mutex::new(Tabs::default()),
            persister: Persister::spawn(store),
            session_config,
            overlay_config,
        }
    }

    pub fn with_store(store: Arc<dyn SessionStore>) -> Self {
        Self::new(store, SessionConfig::default(), OverlayConfig::default())
    }

    async fn load(&self, tab_id: TabId, pending: persister::PendingRead) -> TabState {
        match pending.await {
            Ok(Ok(Some(stored))) => {
                debug!("Restored state for tab {}", tab_id);
                TabState::restore(&stored, &self.session_config)
            }
            Ok(Ok(None)) => TabState::new(&self.session_config),
            Ok(Err(e)) => {
                warn!("Failed to restore tab {}: {}", tab_id, e);
                TabState::new(&self.session_config)
            }
            Err(_) => {
                warn!("Persister stopped before restoring tab {}", tab_id);
                TabState::new(&self.session_config)
            }
        }
    }

    /// Locks the tab map with `tab_id` present, restoring it from the store first if needed.
    async fn lock_tab(&self, tab_id: TabId) -> MutexGuard<'_, Tabs> {
        loop {
            let tabs = self.tabs.lock().await;
            if tabs.states.contains_key(&tab_id) {
                return tabs;
            }
            let drops = tabs.drops;
            let pending = self.persister.read(storage_key(tab_id));
            drop(tabs);

            let restored = self.load(tab_id, pending).await;

            let mut tabs = self.tabs.lock().await;
            if tabs.drops != drops {
                // A tab was dropped meanwhile; its removal may postdate our read
                continue;
            }
            tabs.states.entry(tab_id).or_insert(restored);
            return tabs;
        }
    }

    /// Runs `f` against the tab's state, creating or restoring it first.
    async fn with_tab<R>(&self, tab_id: TabId, f: impl FnOnce(&mut TabState) -> R) -> R {
        let mut tabs = self.lock_tab(tab_id).await;
        let state = tabs
            .states
            .entry(tab_id)
            .or_insert_with(|| TabState::new(&self.session_config));
        f(state)
    }

    /// Like [`Self::with_tab`], and queues the updated state for persistence before the
    /// lock is released.
    async fn mutate<R>(&self, tab_id: TabId, f: impl FnOnce(&mut TabState) -> R) -> R {
        self.with_tab(tab_id, |state| {
            let result = f(state);
            self.persist(tab_id, &state.snapshot());
            result
        })
        .await
    }

    fn persist(&self, tab_id: TabId, snapshot: &TabSnapshot) {
        match serde_json::to_value(snapshot) {
            Ok(value) => self.persister.write(storage_key(tab_id), value),
            Err(e) => warn!("Failed to serialize tab {}: {}", tab_id, e),
        }
    }

    pub async fn get_state(&self, tab_id: TabId) -> TabSnapshot {
        self.with_tab(tab_id, |state| state.snapshot()).await
    }

    pub async fn record_interaction(&self, tab_id: TabId, interaction: Interaction) {
        debug!(
            "Tab {}: {:?} on {}",
            tab_id, interaction.kind, interaction.element_key
        );
        self.mutate(tab_id, |state| state.interactions.push(interaction))
            .await;
    }

    /// The method is stored uppercased.
    pub async fn record_request(&self, tab_id: TabId, mut request: NetworkRequest) {
        request.method = request.method.to_uppercase();
        debug!(
            "Tab {}: {} {} -> {}",
            tab_id, request.method, request.url, request.status
        );
        self.mutate(tab_id, |state| state.requests.push(request)).await;
    }

    pub async fn set_link_window(&self, tab_id: TabId, ms: f64) -> Result<(), SessionError> {
        self.with_tab(tab_id, |state| {
            state.set_link_window(ms)?;
            self.persist(tab_id, &state.snapshot());
            Ok(())
        })
        .await
        .inspect_err(|e| warn!("Tab {}: {}", tab_id, e))
    }

    pub async fn set_inspect_mode(&self, tab_id: TabId, enabled: bool) {
        self.mutate(tab_id, |state| state.inspect_mode = enabled)
            .await;
    }

    pub async fn set_overlay_ui(&self, tab_id: TabId, update: &OverlayUiUpdate) {
        self.mutate(tab_id, |state| state.apply_overlay_update(update))
            .await;
    }

    pub async fn clear_history(&self, tab_id: TabId) {
        self.mutate(tab_id, |state| state.clear_history()).await;
    }

    /// Forgets the tab in memory and removes its persisted record.
    pub async fn drop_tab(&self, tab_id: TabId) {
        let mut tabs = self.tabs.lock().await;
        let removed = tabs.states.remove(&tab_id).is_some();
        tabs.drops += 1;
        self.persister.remove(storage_key(tab_id));
        drop(tabs);
        info!("Tab {} closed (had state: {})", tab_id, removed);
    }

    /// Requests grouped by the element key of their linked interaction.
    pub async fn linked_requests(&self, tab_id: TabId) -> Vec<ElementRequests> {
        let max_per_element = self.overlay_config.max_requests_per_element;
        self.with_tab(tab_id, |state| {
            ElementRequestIndex::rebuild(
                &state.interactions,
                &state.requests,
                state.link_window_ms,
                max_per_element,
            )
            .groups()
        })
        .await
    }

    /// What the overlay shows for the element under the pointer. `None` means nothing is
    /// hovered: inspect mode is off, the target is empty, or it has no size.
    pub async fn hover(
        &self,
        tab_id: TabId,
        target: &ElementPath,
        rect: Option<Rect>,
    ) -> Option<HoveredElement> {
        if rect.is_some_and(|r| r.is_empty()) {
            return None;
        }
        let cursor = PathCursor::new(target)?;
        let resolved = identity::resolve_target(&cursor);
        let (element_key, element_meta) = identity::resolve_identity(&resolved);

        let max_per_element = self.overlay_config.max_requests_per_element;
        let tooltip_limit = self.overlay_config.tooltip_limit;

        self.with_tab(tab_id, |state| {
            if !state.inspect_mode {
                return None;
            }
            let index = ElementRequestIndex::rebuild(
                &state.interactions,
                &state.requests,
                state.link_window_ms,
                max_per_element,
            );
            let requests = index
                .requests_for(&element_key, tooltip_limit)
                .into_iter()
                .cloned()
                .collect();
            Some(HoveredElement {
                total_linked: index.linked_count(&element_key),
                element_key,
                element_meta,
                requests,
            })
        })
        .await
    }

    pub async fn tab_count(&self) -> usize {
        self.tabs.lock().await.states.len()
    }

    /// Waits for every persistence write issued so far.
    pub async fn flush(&self) {
        self.persister.flush().await;
    }
}
