//! Deferred and pending reference collections.
//!
//! Both collections are keyed by a case-insensitive symbol name. Entries are
//! never shifted while a list exists: consuming an entry leaves a tombstone,
//! so `[start, end)` ranges handed to queued batches keep pointing at the
//! same entries. A list whose last live entry is consumed is dropped.

use crate::relationship::{CallSiteContext, ReferenceType};
use crate::storage::CaseInsensitiveMap;
use crate::symbol::SymbolRef;
use crate::types::{FileUri, Range};
use serde::{Deserialize, Serialize};

/// "I know my source, I'm waiting for a symbol named X." Keyed by target name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredReference {
    pub source_symbol: SymbolRef,
    pub reference_type: ReferenceType,
    pub location: Range,
    pub context: Option<CallSiteContext>,
}

/// "My target exists, I'm waiting for my own source." Keyed by source name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeferredReference {
    pub target_symbol_name: String,
    pub reference_type: ReferenceType,
    pub location: Range,
    pub context: Option<CallSiteContext>,
    /// File the source was declared in when the reference was recorded.
    pub source_file_uri: Option<FileUri>,
}

#[derive(Debug, Clone)]
struct NamedEntries<T> {
    /// Original spelling of the key
    name: String,
    entries: Vec<Option<T>>,
    live: usize,
}

/// Lists of entries grouped by case-insensitive name.
#[derive(Debug, Clone)]
pub struct ReferenceLists<T> {
    lists: CaseInsensitiveMap<NamedEntries<T>>,
}

impl<T> Default for ReferenceLists<T> {
    fn default() -> Self {
        Self {
            lists: CaseInsensitiveMap::new(),
        }
    }
}

impl<T: Clone> ReferenceLists<T> {
    /// Append an entry. Returns its index in the name's list.
    pub fn push(&mut self, name: &str, entry: T) -> usize {
        let list = self.lists.get_or_insert_with(name, || NamedEntries {
            name: name.to_string(),
            entries: Vec::new(),
            live: 0,
        });
        list.entries.push(Some(entry));
        list.live += 1;
        list.entries.len() - 1
    }

    /// Length of the name's list, tombstones included. Batch ranges index into this.
    pub fn slots(&self, name: &str) -> usize {
        self.lists.get(name).map_or(0, |list| list.entries.len())
    }

    /// Number of entries still waiting under `name`.
    pub fn live(&self, name: &str) -> usize {
        self.lists.get(name).map_or(0, |list| list.live)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lists.contains_key(name)
    }

    pub fn get(&self, name: &str, index: usize) -> Option<&T> {
        self.lists
            .get(name)
            .and_then(|list| list.entries.get(index))
            .and_then(Option::as_ref)
    }

    /// Live entries in `[start, end)` with their indices.
    pub fn slice(&self, name: &str, start: usize, end: usize) -> Vec<(usize, T)> {
        let Some(list) = self.lists.get(name) else {
            return Vec::new();
        };

        let end = end.min(list.entries.len());
        (start.min(end)..end)
            .filter_map(|i| list.entries[i].as_ref().map(|entry| (i, entry.clone())))
            .collect()
    }

    /// Remove one entry and hand it back.
    pub fn take(&mut self, name: &str, index: usize) -> Option<T> {
        let list = self.lists.get_mut(name)?;
        let entry = list.entries.get_mut(index)?.take()?;
        list.live -= 1;
        if list.live == 0 {
            self.lists.remove(name);
        }
        Some(entry)
    }

    /// Remove one entry only if it still equals `expected`. A batch holding
    /// a snapshot of the list uses this so it never takes an entry that was
    /// consumed and replaced under the same index.
    pub fn take_if_eq(&mut self, name: &str, index: usize, expected: &T) -> Option<T>
    where
        T: PartialEq,
    {
        if self.get(name, index) != Some(expected) {
            return None;
        }
        self.take(name, index)
    }

    /// Remove every live entry of `name`.
    pub fn take_all(&mut self, name: &str) -> Vec<T> {
        self.lists
            .remove(name)
            .map(|list| list.entries.into_iter().flatten().collect())
            .unwrap_or_default()
    }

    /// Drop entries across all names for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut removed = 0;
        self.lists.retain(|_, list| {
            for slot in list.entries.iter_mut() {
                if slot.as_ref().is_some_and(|entry| !keep(entry)) {
                    *slot = None;
                    list.live -= 1;
                    removed += 1;
                }
            }
            list.live > 0
        });
        removed
    }

    /// Original spellings of every name with live entries.
    pub fn names(&self) -> Vec<String> {
        self.lists.values().map(|list| list.name.clone()).collect()
    }

    /// Live entries across all names.
    pub fn total(&self) -> usize {
        self.lists.values().map(|list| list.live).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn clear(&mut self) {
        self.lists.clear();
    }
}

/// The two waiting collections.
#[derive(Debug, Default)]
pub struct ReferenceStore {
    /// Keyed by target name
    pub deferred: ReferenceLists<DeferredReference>,
    /// Keyed by source name
    pub pending: ReferenceLists<PendingDeferredReference>,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything recorded on behalf of sources declared in `file_uri`.
    /// Reparsing the file records them again.
    pub fn remove_source_file(&mut self, file_uri: &FileUri) -> usize {
        let deferred = self
            .deferred
            .retain(|entry| entry.source_symbol.file_uri.as_ref() != Some(file_uri));
        let pending = self
            .pending
            .retain(|entry| entry.source_file_uri.as_ref() != Some(file_uri));
        deferred + pending
    }
}
