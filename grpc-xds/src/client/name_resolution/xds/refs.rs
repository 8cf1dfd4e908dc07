/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to
 * deal in the Software without restriction, including without limitation the
 * rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
 * sell copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
 * IN THE SOFTWARE.
 *
 */

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ClusterRefEntry {
    in_current_table: bool,
    ref_count: usize,
}

/// Tracks the clusters reachable through the current route table together
/// with the number of in-flight calls using each.
///
/// An entry exists exactly while its cluster is in the current table or is
/// still referenced by a call.
#[derive(Debug, Default)]
pub(crate) struct ClusterRefTable {
    entries: BTreeMap<String, ClusterRefEntry>,
}

impl ClusterRefTable {
    /// Marks exactly `clusters` as being in the current table, dropping
    /// entries that are neither in it nor referenced.
    pub(crate) fn reconcile(&mut self, clusters: &BTreeSet<String>) {
        self.entries.retain(|name, entry| {
            if !clusters.contains(name) {
                entry.in_current_table = false;
            }
            entry.in_current_table || entry.ref_count > 0
        });
        for name in clusters {
            self.entries.entry(name.clone()).or_default().in_current_table = true;
        }
    }

    /// Takes a reference on `name`.  Returns false, taking nothing, if the
    /// cluster has no entry.
    pub(crate) fn add_ref(&mut self, name: &str) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.ref_count += 1;
                true
            }
            None => false,
        }
    }

    /// Releases a reference taken by [`Self::add_ref`].  Returns true if the
    /// entry was removed as a result.
    pub(crate) fn unref(&mut self, name: &str) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 && !entry.in_current_table {
            self.entries.remove(name);
            return true;
        }
        false
    }

    /// All clusters with an entry, in sorted order.
    pub(crate) fn cluster_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|e| e.ref_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn names(table: &ClusterRefTable) -> Vec<&str> {
        table.cluster_names().collect()
    }

    #[test]
    fn reconcile_adds_and_removes() {
        let mut table = ClusterRefTable::default();
        table.reconcile(&set(&["a", "b"]));
        assert_eq!(names(&table), vec!["a", "b"]);
        assert_eq!(table.ref_count("a"), Some(0));

        table.reconcile(&set(&["b", "c"]));
        assert_eq!(names(&table), vec!["b", "c"]);
    }

    #[test]
    fn referenced_cluster_outlives_table() {
        let mut table = ClusterRefTable::default();
        table.reconcile(&set(&["a"]));
        assert!(table.add_ref("a"));
        table.reconcile(&set(&["b"]));
        assert_eq!(names(&table), vec!["a", "b"]);

        assert!(table.unref("a"));
        assert_eq!(names(&table), vec!["b"]);
    }

    #[test]
    fn unref_of_current_cluster_keeps_entry() {
        let mut table = ClusterRefTable::default();
        table.reconcile(&set(&["a"]));
        assert!(table.add_ref("a"));
        assert!(table.add_ref("a"));
        assert!(!table.unref("a"));
        assert!(!table.unref("a"));
        assert_eq!(table.ref_count("a"), Some(0));
        assert_eq!(names(&table), vec!["a"]);
    }

    #[test]
    fn readded_cluster_keeps_refs() {
        let mut table = ClusterRefTable::default();
        table.reconcile(&set(&["a"]));
        table.add_ref("a");
        table.reconcile(&set(&[]));
        table.reconcile(&set(&["a"]));
        assert!(!table.unref("a"));
        assert_eq!(names(&table), vec!["a"]);
    }

    #[test]
    fn missing_cluster() {
        let mut table = ClusterRefTable::default();
        assert!(!table.add_ref("a"));
        assert!(!table.unref("a"));
        assert_eq!(table.ref_count("a"), None);
    }
}
