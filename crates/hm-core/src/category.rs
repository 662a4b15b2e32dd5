//! Dense category enumeration.
//!
//! Categories are discovered once in a pre-pass and mapped to slot indices so
//! that the accumulator tables are plain arrays. The Total series is the last
//! slot and is produced by summing the others.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::types::Stop;

/// Label of the all-category series.
pub const TOTAL: &str = "Total";

/// Label given to unlabelled visits when categories are in use.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Index into the category dimension of a table.
pub type CategorySlot = usize;

/// Ordered set of categories plus the Total pseudo-category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySet {
    labels: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, CategorySlot>,
    #[serde(skip)]
    excluded: HashSet<String>,
    enabled: bool,
}

impl CategorySet {
    /// A set with only the Total series; every visit maps to it.
    pub fn total_only() -> Self {
        Self::total_excluding(&[])
    }

    /// A Total-only set that still skips visits in `excluded` categories.
    pub fn total_excluding(excluded: &[String]) -> Self {
        Self {
            labels: Vec::new(),
            index: HashMap::new(),
            excluded: excluded.iter().cloned().collect(),
            enabled: false,
        }
    }

    /// Discovers categories from `stops`, skipping `excluded` labels.
    pub fn discover<S: Stop>(stops: &[S], excluded: &[String]) -> Self {
        Self::from_labels(stops.iter().map(|s| s.category()), excluded)
    }

    /// Builds the set from visit labels; `None` stands for an unlabelled visit.
    pub fn from_labels<'a, I>(labels: I, excluded: &[String]) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let excluded: HashSet<String> = excluded.iter().cloned().collect();
        let labels: BTreeSet<&str> = labels
            .into_iter()
            .map(|label| label.unwrap_or(UNCATEGORIZED))
            .filter(|label| !excluded.contains(*label))
            .collect();
        let labels: Vec<String> = labels.into_iter().map(String::from).collect();
        let index = labels
            .iter()
            .enumerate()
            .map(|(slot, label)| (label.clone(), slot))
            .collect();
        Self {
            labels,
            index,
            excluded,
            enabled: true,
        }
    }

    /// Whether per-category series are produced.
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Number of slots, including Total.
    pub fn slots(&self) -> usize {
        self.labels.len() + 1
    }

    /// Slot of the Total series.
    pub fn total_slot(&self) -> CategorySlot {
        self.labels.len()
    }

    /// Slots of the real categories, excluding Total.
    pub fn category_slots(&self) -> std::ops::Range<CategorySlot> {
        0..self.labels.len()
    }

    /// Label of `slot`.
    pub fn label(&self, slot: CategorySlot) -> &str {
        self.labels.get(slot).map_or(TOTAL, String::as_str)
    }

    /// Resolves the slot a visit contributes to.
    ///
    /// Returns `None` for excluded categories. With categories disabled every
    /// visit goes straight to the Total slot.
    pub fn resolve(&self, category: Option<&str>) -> Option<CategorySlot> {
        let label = category.unwrap_or(UNCATEGORIZED);
        if self.excluded.contains(label) {
            return None;
        }
        if !self.enabled {
            return Some(self.total_slot());
        }
        self.index.get(label).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Visit;
    use chrono::NaiveDate;

    fn visit(category: Option<&str>) -> Visit {
        let t = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let v = Visit::new("v", t, t);
        match category {
            Some(c) => v.with_category(c),
            None => v,
        }
    }

    #[test]
    fn test_discover_sorts_and_indexes() {
        let stops = vec![visit(Some("ICU")), visit(Some("ART")), visit(Some("ICU"))];
        let set = CategorySet::discover(&stops, &[]);
        assert_eq!(set.slots(), 3);
        assert_eq!(set.label(0), "ART");
        assert_eq!(set.label(1), "ICU");
        assert_eq!(set.label(set.total_slot()), TOTAL);
        assert_eq!(set.resolve(Some("ICU")), Some(1));
    }

    #[test]
    fn test_unlabelled_and_excluded() {
        let stops = vec![visit(None), visit(Some("OBS")), visit(Some("ART"))];
        let set = CategorySet::discover(&stops, &["OBS".to_string()]);
        assert_eq!(set.category_slots().len(), 2);
        assert_eq!(set.resolve(None), Some(1));
        assert_eq!(set.label(1), UNCATEGORIZED);
        assert_eq!(set.resolve(Some("OBS")), None);
    }

    #[test]
    fn test_from_labels() {
        let set = CategorySet::from_labels([Some("ICU"), None, Some("ICU")], &[]);
        assert_eq!(set.category_slots().len(), 2);
        assert_eq!(set.label(0), "ICU");
        assert_eq!(set.resolve(None), Some(1));
        assert_eq!(set.resolve(Some("ART")), None);
    }

    #[test]
    fn test_total_only_maps_everything_to_total() {
        let set = CategorySet::total_only();
        assert_eq!(set.slots(), 1);
        assert_eq!(set.resolve(Some("ICU")), Some(0));
        assert_eq!(set.label(0), TOTAL);
    }

    #[test]
    fn test_exclusion_applies_without_categories() {
        let set = CategorySet::total_excluding(&["OBS".to_string()]);
        assert_eq!(set.resolve(Some("OBS")), None);
        assert_eq!(set.resolve(Some("ART")), Some(0));
        assert_eq!(set.resolve(None), Some(0));
    }
}
