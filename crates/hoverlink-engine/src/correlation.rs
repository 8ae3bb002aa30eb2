//! Request-to-interaction correlation.
//!
//! A request is linked to the most recent interaction that happened at or before the
//! request started, no earlier than `link_window_ms` before it. The match is element
//! agnostic; grouping by element happens afterwards through the interaction's key.

use hoverlink_common::protocol::{ElementKey, ElementRequests, Interaction, NetworkRequest};
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_LINK_WINDOW_MS: f64 = 1500.0;
pub const DEFAULT_MAX_REQUESTS_PER_ELEMENT: usize = 10;

/// Nearest preceding interaction within `[ts_start - link_window_ms, ts_start]`.
///
/// `interactions` must be in non-decreasing timestamp order; the scan runs newest to
/// oldest and stops at the first interaction that is older than the window.
pub fn link_request_to_interaction<'a, I>(
    interactions: I,
    request: &NetworkRequest,
    link_window_ms: f64,
) -> Option<&'a Interaction>
where
    I: IntoIterator<Item = &'a Interaction>,
    I::IntoIter: DoubleEndedIterator,
{
    let latest_allowed = request.ts_start as f64;
    let earliest_allowed = latest_allowed - link_window_ms;

    for interaction in interactions.into_iter().rev() {
        let ts = interaction.timestamp as f64;
        if ts > latest_allowed {
            continue;
        }
        if ts < earliest_allowed {
            break;
        }
        return Some(interaction);
    }

    None
}

/// Request ids grouped by the element key of their linked interaction, newest first.
#[derive(Debug, Clone, Default)]
pub struct ElementRequestIndex {
    by_element: HashMap<ElementKey, VecDeque<String>>,
    requests: HashMap<String, NetworkRequest>,
    max_per_element: usize,
}

impl ElementRequestIndex {
    pub fn new(max_per_element: usize) -> Self {
        Self {
            by_element: HashMap::new(),
            requests: HashMap::new(),
            max_per_element,
        }
    }

    /// Replays `requests` in order against `interactions`.
    pub fn rebuild<'a, I, R>(
        interactions: I,
        requests: R,
        link_window_ms: f64,
        max_per_element: usize,
    ) -> Self
    where
        I: IntoIterator<Item = &'a Interaction>,
        I::IntoIter: DoubleEndedIterator + Clone,
        R: IntoIterator<Item = &'a NetworkRequest>,
    {
        let interactions = interactions.into_iter();
        let mut index = Self::new(max_per_element);
        for request in requests {
            index.insert(interactions.clone(), request, link_window_ms);
        }
        index
    }

    /// Links `request` and records it under the matched element, if any.
    pub fn insert<'a, I>(
        &mut self,
        interactions: I,
        request: &NetworkRequest,
        link_window_ms: f64,
    ) -> Option<ElementKey>
    where
        I: IntoIterator<Item = &'a Interaction>,
        I::IntoIter: DoubleEndedIterator,
    {
        let interaction = link_request_to_interaction(interactions, request, link_window_ms)?;
        let key = interaction.element_key.clone();

        self.requests.insert(request.id.clone(), request.clone());
        let ids = self.by_element.entry(key.clone()).or_default();
        ids.push_front(request.id.clone());
        ids.truncate(self.max_per_element);

        Some(key)
    }

    pub fn linked_count(&self, key: &ElementKey) -> usize {
        self.by_element.get(key).map_or(0, VecDeque::len)
    }

    pub fn requests_for(&self, key: &ElementKey, limit: usize) -> Vec<&NetworkRequest> {
        self.by_element
            .get(key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.requests.get(id))
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All groups, ordered by element key.
    pub fn groups(&self) -> Vec<ElementRequests> {
        let mut keys: Vec<&ElementKey> = self.by_element.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|key| ElementRequests {
                element_key: key.clone(),
                requests: self
                    .requests_for(key, self.max_per_element)
                    .into_iter()
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}
