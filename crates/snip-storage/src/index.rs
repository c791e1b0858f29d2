use snip_core::{ShortKey, UserUrl};
use std::collections::HashMap;

/// Per-user projection of live records, shared by the memory and file
/// backends.
///
/// Owners with no live records are dropped, so the map length is the
/// number of active owners.
#[derive(Debug, Default)]
pub(crate) struct UserIndex {
    entries: HashMap<String, Vec<UserUrl>>,
}

impl UserIndex {
    pub(crate) fn insert(&mut self, user_id: &str, key: &ShortKey, original_url: &str) {
        self.entries
            .entry(user_id.to_string())
            .or_default()
            .push(UserUrl {
                key: key.clone(),
                original_url: original_url.to_string(),
            });
    }

    /// Unordered remove: the last entry is swapped into the freed slot.
    pub(crate) fn remove(&mut self, user_id: &str, key: &ShortKey) {
        let Some(urls) = self.entries.get_mut(user_id) else {
            return;
        };
        if let Some(idx) = urls.iter().position(|url| &url.key == key) {
            urls.swap_remove(idx);
        }
        if urls.is_empty() {
            self.entries.remove(user_id);
        }
    }

    pub(crate) fn list(&self, user_id: &str) -> Vec<UserUrl> {
        self.entries.get(user_id).cloned().unwrap_or_default()
    }

    pub(crate) fn owners(&self) -> usize {
        self.entries.len()
    }
}
