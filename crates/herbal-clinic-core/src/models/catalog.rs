//! Reference catalog models.

use serde::{Deserialize, Serialize};

/// Which of the three reference catalogs an entry belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Formula,
    Herb,
    Secret,
}

/// Id prefix marking a secret formula kept in the shared formula table.
pub const SECRET_ID_PREFIX: &str = "S";

impl CatalogKind {
    /// Backing table when every catalog has its own table.
    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::Formula => "formulas",
            CatalogKind::Herb => "medicines",
            CatalogKind::Secret => "secret_formulas",
        }
    }

    /// Column holding the composition slot (nature/flavor for single herbs).
    pub fn composition_column(&self) -> &'static str {
        match self {
            CatalogKind::Herb => "nature_flavor",
            CatalogKind::Formula | CatalogKind::Secret => "composition",
        }
    }

    /// Unit a new prescription line gets when taken from this catalog.
    pub fn default_unit(&self) -> &'static str {
        match self {
            CatalogKind::Herb => "錢",
            CatalogKind::Formula | CatalogKind::Secret => "包",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CatalogKind::Formula => "formula",
            CatalogKind::Herb => "herb",
            CatalogKind::Secret => "secret formula",
        }
    }
}

/// One entry in a reference catalog.
///
/// Formulas, single herbs and secret formulas share this shape. For herbs
/// `composition` carries the nature/flavor text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    /// Caller-assigned code, unique per catalog (e.g. "F100", "S001")
    pub id: String,
    pub name: String,
    /// Classical source
    pub origin: Option<String>,
    pub composition: Option<String>,
    pub effect: Option<String>,
    /// Therapeutic use
    pub indication: Option<String>,
    /// Usage instructions
    pub application: Option<String>,
    /// Warnings and side effects
    pub warnings: Option<String>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Text of one detail section, empty when unset.
    pub fn section(&self, section: InfoSection) -> &str {
        let text = match section {
            InfoSection::Origin => &self.origin,
            InfoSection::Composition => &self.composition,
            InfoSection::Effect => &self.effect,
            InfoSection::Indication => &self.indication,
            InfoSection::Application => &self.application,
            InfoSection::Warnings => &self.warnings,
        };
        text.as_deref().unwrap_or("")
    }
}

/// Detail-panel sections of a catalog entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum InfoSection {
    Origin,
    Composition,
    Effect,
    #[default]
    Indication,
    Application,
    Warnings,
}

/// A catalog item picked for a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CatalogItemRef {
    Formula(String),
    Herb(String),
    Secret(String),
}

impl CatalogItemRef {
    pub fn kind(&self) -> CatalogKind {
        match self {
            CatalogItemRef::Formula(_) => CatalogKind::Formula,
            CatalogItemRef::Herb(_) => CatalogKind::Herb,
            CatalogItemRef::Secret(_) => CatalogKind::Secret,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CatalogItemRef::Formula(id) | CatalogItemRef::Herb(id) | CatalogItemRef::Secret(id) => {
                id
            }
        }
    }
}

/// Outcome of a catalog save.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults_to_indication() {
        let mut entry = CatalogEntry::new("F100", "桂枝湯");
        entry.indication = Some("外感風寒表虛證".into());

        assert_eq!(entry.section(InfoSection::default()), "外感風寒表虛證");
        assert_eq!(entry.section(InfoSection::Warnings), "");
    }

    #[test]
    fn test_item_ref_kind() {
        let item = CatalogItemRef::Herb("H001".into());
        assert_eq!(item.kind(), CatalogKind::Herb);
        assert_eq!(item.id(), "H001");
        assert_eq!(item.kind().default_unit(), "錢");
        assert_eq!(CatalogKind::Secret.default_unit(), "包");
    }

    #[test]
    fn test_herb_composition_column() {
        assert_eq!(CatalogKind::Herb.composition_column(), "nature_flavor");
        assert_eq!(CatalogKind::Formula.composition_column(), "composition");
    }
}
