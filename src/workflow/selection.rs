use std::collections::BTreeSet;

use crate::model::RecordId;

/// Record ids checked for a bulk action, plus the bulk-action menu that the
/// selection gates.
///
/// The set is deliberately not pruned when the visible page or filter
/// changes; ids selected on another page stay selected until cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<RecordId>,
    menu_open: bool,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checked replaces the set with `all_ids`; unchecked empties it.
    pub fn select_all<I, S>(&mut self, all_ids: I, checked: bool)
    where
        I: IntoIterator<Item = S>,
        S: Into<RecordId>,
    {
        if checked {
            self.ids = all_ids.into_iter().map(Into::into).collect();
            if self.ids.is_empty() {
                self.menu_open = false;
            }
        } else {
            self.clear();
        }
    }

    pub fn select_one(&mut self, id: impl Into<RecordId>, checked: bool) {
        let id = id.into();
        if checked {
            self.ids.insert(id);
        } else {
            self.ids.remove(&id);
            if self.ids.is_empty() {
                self.menu_open = false;
            }
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.menu_open = false;
    }

    /// Drops ids that are not in `visible`. Never called implicitly.
    pub fn retain_visible<'a>(&mut self, visible: impl IntoIterator<Item = &'a RecordId>) {
        let visible: BTreeSet<&RecordId> = visible.into_iter().collect();
        self.ids.retain(|id| visible.contains(id));
        if self.ids.is_empty() {
            self.menu_open = false;
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Whether every id of the current page is selected ("select all" checkbox).
    pub fn covers<'a>(&self, page_ids: impl IntoIterator<Item = &'a RecordId>) -> bool {
        let mut any = false;
        for id in page_ids {
            any = true;
            if !self.ids.contains(id) {
                return false;
            }
        }
        any
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.ids.iter().cloned().collect()
    }

    /// Opens the bulk-action menu; refused while nothing is selected.
    pub fn open_menu(&mut self) -> bool {
        self.menu_open = !self.ids.is_empty();
        self.menu_open
    }

    pub fn close_menu(&mut self) {
        self.menu_open = false;
    }

    pub fn is_menu_open(&self) -> bool {
        self.menu_open
    }
}
