//! Pure directory diffing, independent of the timer that drives it.

use std::collections::BTreeMap;

/// Relative path → modification time (ms since epoch).
pub type Timestamps = BTreeMap<String, u64>;

/// Paths that differ between two listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    /// New files and files whose timestamp moved.
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.len() + self.removed.len()
    }

    /// Newest timestamp among the modified paths in `current`.
    pub fn latest(&self, current: &Timestamps) -> Option<u64> {
        self.modified
            .iter()
            .filter_map(|path| current.get(path))
            .copied()
            .max()
    }
}

/// Compare the previously recorded timestamps against a fresh listing.
pub fn diff(previous: &Timestamps, current: &Timestamps) -> Changes {
    let modified = current
        .iter()
        .filter(|(path, mtime)| previous.get(*path) != Some(*mtime))
        .map(|(path, _)| path.clone())
        .collect();
    let removed = previous
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();
    Changes { modified, removed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(entries: &[(&str, u64)]) -> Timestamps {
        entries.iter().map(|(p, t)| (p.to_string(), *t)).collect()
    }

    #[test]
    fn test_identical_listing_is_empty() {
        let a = listing(&[("a.ts", 1), ("b.ts", 2)]);
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_first_listing_reports_everything() {
        let current = listing(&[("a.ts", 1), ("b.ts", 2)]);
        let changes = diff(&Timestamps::new(), &current);
        assert_eq!(changes.modified, vec!["a.ts", "b.ts"]);
        assert_eq!(changes.latest(&current), Some(2));
    }

    #[test]
    fn test_modified_added_removed() {
        let previous = listing(&[("a.ts", 1), ("b.ts", 2), ("gone.ts", 3)]);
        let current = listing(&[("a.ts", 5), ("b.ts", 2), ("new.ts", 4)]);
        let changes = diff(&previous, &current);

        assert_eq!(changes.modified, vec!["a.ts", "new.ts"]);
        assert_eq!(changes.removed, vec!["gone.ts"]);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes.latest(&current), Some(5));
    }

    #[test]
    fn test_older_timestamp_still_counts() {
        // Restored from backup: mtime goes backwards
        let changes = diff(&listing(&[("a.ts", 9)]), &listing(&[("a.ts", 3)]));
        assert_eq!(changes.modified, vec!["a.ts"]);
    }

    #[test]
    fn test_removal_only_has_no_latest() {
        let previous = listing(&[("a.ts", 1)]);
        let current = Timestamps::new();
        let changes = diff(&previous, &current);
        assert!(!changes.is_empty());
        assert_eq!(changes.latest(&current), None);
    }
}
