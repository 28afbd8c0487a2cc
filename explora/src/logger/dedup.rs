// src/logger/dedup.rs
//
// Rolling context dictionary for the interaction channel (protocol v2).
// Repeated context payloads inside a batch are shipped once in the
// dictionary and referenced by a small integer id. An entry expires once
// it has gone a full flush window without being referenced. The full
// payload is stored beside its hash, so a hash collision degrades to a
// fresh entry instead of corrupting a reference.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::logger::event::DictionaryEntry;

fn content_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
struct Entry {
    id: u32,
    payload: String,
    last_seen_flush: u64,
}

#[derive(Debug, Default)]
pub struct DedupDictionary {
    /// content hash → entries (more than one only on a hash collision).
    entries: HashMap<String, Vec<Entry>>,
    next_id: u32,
    /// Completed flush windows.
    flush_count: u64,
}

impl DedupDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a context payload, returning its dictionary id and whether
    /// the entry is new in this window's dictionary.
    pub fn intern(&mut self, payload: &str) -> u32 {
        let hash = content_hash(payload);
        let flush = self.flush_count;
        let bucket = self.entries.entry(hash).or_default();
        if let Some(entry) = bucket.iter_mut().find(|e| e.payload == payload) {
            entry.last_seen_flush = flush;
            return entry.id;
        }
        let id = self.next_id;
        self.next_id += 1;
        bucket.push(Entry {
            id,
            payload: payload.to_string(),
            last_seen_flush: flush,
        });
        id
    }

    /// Dictionary entries for a batch: every entry referenced since the
    /// last flush, ordered by id so references resolve deterministically.
    pub fn batch_dictionary(&self) -> Vec<DictionaryEntry> {
        let mut out: Vec<DictionaryEntry> = self
            .entries
            .iter()
            .flat_map(|(hash, bucket)| {
                bucket
                    .iter()
                    .filter(|e| e.last_seen_flush == self.flush_count)
                    .map(|e| DictionaryEntry {
                        id: e.id,
                        content_hash: hash.clone(),
                        payload: e.payload.clone(),
                    })
            })
            .collect();
        out.sort_by_key(|e| e.id);
        out
    }

    /// Close the current flush window and evict entries that were not
    /// referenced for one full window.
    ///
    /// An entry last referenced in window `W` survives while `W + 1` is
    /// being built and is evicted when `W + 1` closes without a new
    /// reference.
    pub fn end_flush_window(&mut self) {
        let closing = self.flush_count;
        self.flush_count += 1;
        self.entries.retain(|_, bucket| {
            bucket.retain(|e| e.last_seen_flush >= closing);
            !bucket.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_payloads_share_an_id() {
        let mut dict = DedupDictionary::new();
        let a = dict.intern(r#"{"user":"u1"}"#);
        let b = dict.intern(r#"{"user":"u1"}"#);
        let c = dict.intern(r#"{"user":"u2"}"#);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let entries = dict.batch_dictionary();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].id < entries[1].id);
    }

    #[test]
    fn unreferenced_entries_expire_after_one_window() {
        let mut dict = DedupDictionary::new();
        let a = dict.intern("ctx-a");
        dict.end_flush_window();

        // Window 1: only ctx-b referenced.
        dict.intern("ctx-b");
        dict.end_flush_window();

        // ctx-a went a full window unreferenced; it is gone and a new
        // intern gets a fresh id.
        assert_eq!(dict.len(), 1);
        let a2 = dict.intern("ctx-a");
        assert_ne!(a, a2);
    }

    #[test]
    fn entries_survive_while_referenced() {
        let mut dict = DedupDictionary::new();
        let a = dict.intern("ctx-a");
        dict.end_flush_window();
        let again = dict.intern("ctx-a");
        assert_eq!(a, again);
        dict.end_flush_window();
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn batch_dictionary_only_lists_current_window_references() {
        let mut dict = DedupDictionary::new();
        dict.intern("ctx-a");
        dict.end_flush_window();
        dict.intern("ctx-b");
        let entries = dict.batch_dictionary();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, "ctx-b");
    }
}
