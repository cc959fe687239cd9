//! Visit and prescription models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One stored clinical visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    pub id: i64,
    /// Owning party
    pub party_id: i64,
    /// Date and time of the visit
    pub visited_at: NaiveDateTime,
    /// Amount charged
    pub amount: Option<f64>,
    /// Chief complaint
    pub complaint: Option<String>,
    /// Judgment / diagnosis
    pub judgment: Option<String>,
    /// Outcome, filled in later if at all
    pub outcome: Option<String>,
    /// 1-based sequence number counted from the party's oldest visit
    pub ordinal: u32,
}

/// One stored prescription line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionLine {
    pub id: i64,
    pub party_id: i64,
    /// Owning visit; `None` on rows that predate visit linkage
    pub visit_id: Option<i64>,
    pub name: String,
    pub composition: String,
    pub quantity: i64,
    pub unit: String,
}

/// A prescription line joined with the time of its visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatedLine {
    pub visited_at: Option<NaiveDateTime>,
    pub line: PrescriptionLine,
}

/// A line that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineDraft {
    /// Item name (the merge key)
    pub name: String,
    /// Composition text copied at the time of addition
    pub composition: String,
    /// Quantity, at least 1
    pub quantity: u32,
    /// Free-text unit, e.g. 包 or 錢
    pub unit: String,
}

impl LineDraft {
    pub fn new(
        name: impl Into<String>,
        composition: impl Into<String>,
        quantity: u32,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            composition: composition.into(),
            quantity,
            unit: unit.into(),
        }
    }
}

impl From<PrescriptionLine> for LineDraft {
    fn from(line: PrescriptionLine) -> Self {
        let quantity = u32::try_from(line.quantity)
            .ok()
            .filter(|q| *q > 0)
            .unwrap_or(1);
        Self {
            name: line.name,
            composition: line.composition,
            quantity,
            unit: line.unit,
        }
    }
}

/// Result of copying a previous visit's lines.
#[derive(Debug, Clone, PartialEq)]
pub enum CarryForward {
    Lines(Vec<LineDraft>),
    /// The source visit has nothing to copy
    NoLines,
}

/// An in-progress prescription.
///
/// Adding a line whose name matches an existing line adds to that line's
/// quantity; any other line is appended, so arrival order is preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionDraft {
    lines: Vec<LineDraft>,
}

impl PrescriptionDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line, merging by exact name.
    pub fn add(&mut self, line: LineDraft) {
        match self.lines.iter_mut().find(|existing| existing.name == line.name) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            }
            None => self.lines.push(line),
        }
    }

    /// Merge carried-forward lines; returns false when there was nothing to copy.
    pub fn absorb(&mut self, carried: CarryForward) -> bool {
        match carried {
            CarryForward::Lines(lines) => {
                for line in lines {
                    self.add(line);
                }
                true
            }
            CarryForward::NoLines => false,
        }
    }

    /// Remove the line at `index`.
    pub fn remove(&mut self, index: usize) -> Option<LineDraft> {
        (index < self.lines.len()).then(|| self.lines.remove(index))
    }

    /// Overwrite a line's quantity. Zero is rejected.
    pub fn set_quantity(&mut self, index: usize, quantity: u32) -> bool {
        match self.lines.get_mut(index) {
            Some(line) if quantity > 0 => {
                line.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[LineDraft] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<LineDraft> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn herb(name: &str, quantity: u32) -> LineDraft {
        LineDraft::new(name, "", quantity, "錢")
    }

    #[test]
    fn test_same_name_merges() {
        let mut draft = PrescriptionDraft::new();
        draft.add(herb("甘草", 2));
        draft.add(herb("甘草", 3));

        assert_eq!(draft.len(), 1);
        assert_eq!(draft.lines()[0].quantity, 5);
    }

    #[test]
    fn test_new_names_append_in_order() {
        let mut draft = PrescriptionDraft::new();
        draft.add(herb("甘草", 1));
        draft.add(LineDraft::new("桂枝湯", "桂枝 芍藥 甘草 生薑 大棗", 2, "包"));
        draft.add(herb("黃耆", 1));
        draft.add(herb("甘草", 1));

        let names: Vec<&str> = draft.lines().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["甘草", "桂枝湯", "黃耆"]);
        assert_eq!(draft.lines()[0].quantity, 2);
    }

    #[test]
    fn test_merge_keeps_first_composition_and_unit() {
        let mut draft = PrescriptionDraft::new();
        draft.add(LineDraft::new("四物湯", "當歸 川芎 白芍 熟地", 1, "包"));
        draft.add(LineDraft::new("四物湯", "", 2, "錢"));

        assert_eq!(draft.lines()[0].composition, "當歸 川芎 白芍 熟地");
        assert_eq!(draft.lines()[0].unit, "包");
        assert_eq!(draft.lines()[0].quantity, 3);
    }

    #[test]
    fn test_absorb() {
        let mut draft = PrescriptionDraft::new();
        draft.add(herb("甘草", 1));

        assert!(draft.absorb(CarryForward::Lines(vec![herb("甘草", 2), herb("當歸", 1)])));
        assert_eq!(draft.len(), 2);
        assert_eq!(draft.lines()[0].quantity, 3);

        assert!(!draft.absorb(CarryForward::NoLines));
        assert_eq!(draft.len(), 2);
    }

    #[test]
    fn test_remove_and_set_quantity() {
        let mut draft = PrescriptionDraft::new();
        draft.add(herb("甘草", 1));
        draft.add(herb("當歸", 1));

        assert!(draft.set_quantity(1, 4));
        assert!(!draft.set_quantity(1, 0));
        assert!(!draft.set_quantity(5, 1));
        assert_eq!(draft.lines()[1].quantity, 4);

        assert_eq!(draft.remove(0).map(|l| l.name), Some("甘草".to_string()));
        assert_eq!(draft.remove(3), None);
        assert_eq!(draft.len(), 1);

        draft.clear();
        assert!(draft.is_empty());
    }

    #[test]
    fn test_stored_line_quantity_coerced() {
        let line = PrescriptionLine {
            id: 1,
            party_id: 1,
            visit_id: Some(1),
            name: "甘草".into(),
            composition: String::new(),
            quantity: 0,
            unit: "錢".into(),
        };
        assert_eq!(LineDraft::from(line).quantity, 1);
    }

    proptest! {
        #[test]
        fn merged_draft_has_unique_names_and_total_quantity(
            items in prop::collection::vec((0usize..4, 1u32..20), 0..40)
        ) {
            let names = ["甘草", "當歸", "黃耆", "白朮"];
            let mut draft = PrescriptionDraft::new();
            for (name, quantity) in &items {
                draft.add(herb(names[*name], *quantity));
            }

            // One line per distinct name, in first-arrival order
            let mut expected_order: Vec<&str> = Vec::new();
            for (name, _) in &items {
                if !expected_order.contains(&names[*name]) {
                    expected_order.push(names[*name]);
                }
            }
            let order: Vec<&str> = draft.lines().iter().map(|l| l.name.as_str()).collect();
            prop_assert_eq!(order, expected_order);

            // Quantities are conserved per name
            for line in draft.lines() {
                let expected: u32 = items
                    .iter()
                    .filter(|(name, _)| names[*name] == line.name)
                    .map(|(_, q)| q)
                    .sum();
                prop_assert_eq!(line.quantity, expected);
            }
        }
    }
}
