// Category tree built from the CSV rows:
// Category 1 -> Category 2 -> PLUs.
//
// Both levels keep the order in which names first appear in the file so
// that the remote menu is created in the same order the sheet shows.

use crate::csv_loader::Row;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Category 2 name -> PLUs, in row order.
pub type Subcategories = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    categories: IndexMap<String, Subcategories>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row's PLU under its Category 1 / Category 2 pair,
    /// creating either level on first sight.
    pub fn insert(&mut self, row: &Row) {
        self.categories
            .entry(row.category1.clone())
            .or_default()
            .entry(row.category2.clone())
            .or_default()
            .push(row.plu.clone());
    }

    /// Number of Category 1 groups.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn subcategory_count(&self) -> usize {
        self.categories.values().map(IndexMap::len).sum()
    }

    pub fn plu_count(&self) -> usize {
        self.categories
            .values()
            .flat_map(IndexMap::values)
            .map(Vec::len)
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, category1: &str) -> Option<&Subcategories> {
        self.categories.get(category1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Subcategories)> {
        self.categories.iter().map(|(name, subs)| (name.as_str(), subs))
    }

    /// Drop repeated PLUs inside each Category 2 group, keeping the first
    /// occurrence. Returns how many were removed.
    pub fn dedupe_plus(&mut self) -> usize {
        let mut removed = 0;
        for plus in self.categories.values_mut().flat_map(|subs| subs.values_mut()) {
            let mut seen = HashSet::new();
            let before = plus.len();
            plus.retain(|plu| seen.insert(plu.clone()));
            removed += before - plus.len();
        }
        removed
    }
}

pub fn build_structure(rows: &[Row]) -> Structure {
    let mut structure = Structure::new();
    for row in rows {
        structure.insert(row);
    }
    structure
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[(&str, &str, &str)]) -> Vec<Row> {
        data.iter().map(|(a, b, c)| Row::new(a, b, c)).collect()
    }

    #[test]
    fn top_level_keys_follow_first_appearance() {
        let s = build_structure(&rows(&[
            ("Mains", "Pasta", "P1"),
            ("Drinks", "Cold", "P2"),
            ("Mains", "Pizza", "P3"),
            ("Desserts", "Cake", "P4"),
            ("Drinks", "Hot", "P5"),
        ]));
        let names: Vec<&str> = s.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Mains", "Drinks", "Desserts"]);
        assert_eq!(s.len(), 3);

        let mains: Vec<&String> = s.get("Mains").unwrap().keys().collect();
        assert_eq!(mains, vec!["Pasta", "Pizza"]);
    }

    #[test]
    fn plus_keep_row_order_and_duplicates() {
        let s = build_structure(&rows(&[
            ("Food", "Drinks", "P2"),
            ("Food", "Snacks", "P9"),
            ("Food", "Drinks", "P1"),
            ("Food", "Drinks", "P2"),
        ]));
        assert_eq!(s.get("Food").unwrap()["Drinks"], vec!["P2", "P1", "P2"]);
        assert_eq!(s.subcategory_count(), 2);
        assert_eq!(s.plu_count(), 4);
    }

    #[test]
    fn same_subcategory_name_under_different_parents_is_separate() {
        let s = build_structure(&rows(&[("Food", "Specials", "P1"), ("Drinks", "Specials", "P2")]));
        assert_eq!(s.get("Food").unwrap()["Specials"], vec!["P1"]);
        assert_eq!(s.get("Drinks").unwrap()["Specials"], vec!["P2"]);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let mut s = build_structure(&rows(&[
            ("Food", "Drinks", "P2"),
            ("Food", "Drinks", "P1"),
            ("Food", "Drinks", "P2"),
            ("Food", "Snacks", "P2"),
        ]));
        assert_eq!(s.dedupe_plus(), 1);
        assert_eq!(s.get("Food").unwrap()["Drinks"], vec!["P2", "P1"]);
        assert_eq!(s.get("Food").unwrap()["Snacks"], vec!["P2"]);
    }

    #[test]
    fn empty_input_gives_empty_structure() {
        let s = build_structure(&[]);
        assert!(s.is_empty());
        assert_eq!(s.subcategory_count(), 0);
    }
}
