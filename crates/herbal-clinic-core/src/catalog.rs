//! Reference catalogs (formulas, single herbs, secret formulas).
//!
//! One [`Catalog`] type serves all three; they differ only in backing table
//! and in which ids belong to the view.

use rusqlite::{params, Row};

use crate::db::{contains_pattern, DbError, DbResult, Session};
use crate::models::{CatalogEntry, CatalogItemRef, CatalogKind, LineDraft, Upsert, SECRET_ID_PREFIX};

/// Which ids of a table a catalog operation sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    All,
    /// Formulas without the secret prefix
    Regular,
    /// Secret formulas kept in the shared formula table
    SecretOnly,
}

impl Scope {
    fn clause(&self) -> &'static str {
        match self {
            Scope::All => "1 = 1",
            Scope::Regular => "upper(substr(id, 1, 1)) <> 'S'",
            Scope::SecretOnly => "upper(substr(id, 1, 1)) = 'S'",
        }
    }
}

/// Resolved backing table for a catalog.
#[derive(Debug, Clone, Copy)]
struct Source {
    table: &'static str,
    composition: &'static str,
    /// Scope for listing and search
    listing: Scope,
    /// Scope for single-id lookup, save and delete
    keyed: Scope,
}

/// A keyed reference catalog over one backing table.
pub struct Catalog<'a> {
    session: &'a Session,
    kind: CatalogKind,
}

impl<'a> Catalog<'a> {
    pub fn new(session: &'a Session, kind: CatalogKind) -> Self {
        Self { session, kind }
    }

    pub fn formulas(session: &'a Session) -> Self {
        Self::new(session, CatalogKind::Formula)
    }

    pub fn herbs(session: &'a Session) -> Self {
        Self::new(session, CatalogKind::Herb)
    }

    pub fn secrets(session: &'a Session) -> Self {
        Self::new(session, CatalogKind::Secret)
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    /// Whether secret formulas have their own table in this store.
    pub fn has_dedicated_secret_table(&self) -> DbResult<bool> {
        self.session.table_exists(CatalogKind::Secret.table())
    }

    fn source(&self) -> DbResult<Source> {
        let composition = self.kind.composition_column();
        let source = match self.kind {
            CatalogKind::Formula => Source {
                table: CatalogKind::Formula.table(),
                composition,
                listing: Scope::Regular,
                keyed: Scope::All,
            },
            CatalogKind::Herb => Source {
                table: CatalogKind::Herb.table(),
                composition,
                listing: Scope::All,
                keyed: Scope::All,
            },
            CatalogKind::Secret if self.has_dedicated_secret_table()? => Source {
                table: CatalogKind::Secret.table(),
                composition,
                listing: Scope::All,
                keyed: Scope::All,
            },
            CatalogKind::Secret => Source {
                table: CatalogKind::Formula.table(),
                composition,
                listing: Scope::SecretOnly,
                keyed: Scope::SecretOnly,
            },
        };
        Ok(source)
    }

    fn select(source: &Source) -> String {
        format!(
            "SELECT id, name, origin_text, {}, effect, indication, application, warnings_side_effects FROM {}",
            source.composition, source.table
        )
    }

    /// Every entry in the view, ordered by id.
    pub fn list_all(&self) -> DbResult<Vec<CatalogEntry>> {
        let source = self.source()?;
        self.session.query(
            &format!(
                "{} WHERE {} ORDER BY id",
                Self::select(&source),
                source.listing.clause()
            ),
            [],
            entry_from_row,
        )
    }

    pub fn find_by_id(&self, id: &str) -> DbResult<Option<CatalogEntry>> {
        let source = self.source()?;
        self.session.query_opt(
            &format!(
                "{} WHERE id = ?1 AND {}",
                Self::select(&source),
                source.keyed.clause()
            ),
            [id],
            entry_from_row,
        )
    }

    /// Entries whose id or name contains `text`. Blank text lists all.
    pub fn search(&self, text: &str) -> DbResult<Vec<CatalogEntry>> {
        let text = text.trim();
        if text.is_empty() {
            return self.list_all();
        }
        let source = self.source()?;
        self.session.query(
            &format!(
                r#"{} WHERE (id LIKE ?1 ESCAPE '\' OR name LIKE ?1 ESCAPE '\') AND {} ORDER BY id"#,
                Self::select(&source),
                source.listing.clause()
            ),
            [contains_pattern(text)],
            entry_from_row,
        )
    }

    /// Insert the entry, or update it when its id is already stored.
    pub fn save(&self, entry: &CatalogEntry) -> DbResult<Upsert> {
        let id = entry.id.trim();
        if id.is_empty() {
            return Err(DbError::validation(format!(
                "{} id must not be empty",
                self.kind.label()
            )));
        }
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(DbError::validation(format!(
                "{} name must not be empty",
                self.kind.label()
            )));
        }

        let source = self.source()?;
        if source.keyed == Scope::SecretOnly && !has_secret_prefix(id) {
            return Err(DbError::validation(format!(
                "secret formula id {id} must start with {SECRET_ID_PREFIX}"
            )));
        }

        let exists = self
            .session
            .query_opt(
                &format!("SELECT 1 FROM {} WHERE id = ?1", source.table),
                [id],
                |row| row.get::<_, i64>(0),
            )?
            .is_some();

        let values = params![
            id,
            name,
            entry.origin,
            entry.composition,
            entry.effect,
            entry.indication,
            entry.application,
            entry.warnings,
        ];

        let outcome = if exists {
            self.session.execute(
                &format!(
                    r#"
                    UPDATE {} SET
                        name = ?2,
                        origin_text = ?3,
                        {} = ?4,
                        effect = ?5,
                        indication = ?6,
                        application = ?7,
                        warnings_side_effects = ?8
                    WHERE id = ?1
                    "#,
                    source.table, source.composition
                ),
                values,
            )?;
            Upsert::Updated
        } else {
            self.session.execute(
                &format!(
                    r#"
                    INSERT INTO {} (
                        id, name, origin_text, {}, effect, indication, application, warnings_side_effects
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    source.table, source.composition
                ),
                values,
            )?;
            Upsert::Inserted
        };

        tracing::info!(kind = self.kind.label(), id, ?outcome, "catalog entry saved");
        Ok(outcome)
    }

    pub fn delete(&self, id: &str) -> DbResult<bool> {
        let source = self.source()?;
        let rows = self.session.execute(
            &format!(
                "DELETE FROM {} WHERE id = ?1 AND {}",
                source.table,
                source.keyed.clause()
            ),
            [id],
        )?;
        if rows > 0 {
            tracing::info!(kind = self.kind.label(), id, "catalog entry deleted");
        }
        Ok(rows > 0)
    }

    /// Resolve a picked item into an unsaved prescription line.
    ///
    /// Name and composition are copied; single herbs contribute no
    /// composition. The unit defaults per catalog.
    pub fn line_for(session: &Session, item: &CatalogItemRef, quantity: u32) -> DbResult<LineDraft> {
        if quantity == 0 {
            return Err(DbError::validation("quantity must be at least 1"));
        }
        let kind = item.kind();
        let entry = Catalog::new(session, kind)
            .find_by_id(item.id())?
            .ok_or_else(|| DbError::NotFound(format!("{} {}", kind.label(), item.id())))?;

        let composition = match kind {
            CatalogKind::Herb => String::new(),
            CatalogKind::Formula | CatalogKind::Secret => entry.composition.unwrap_or_default(),
        };
        Ok(LineDraft::new(entry.name, composition, quantity, kind.default_unit()))
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        origin: row.get(2)?,
        composition: row.get(3)?,
        effect: row.get(4)?,
        indication: row.get(5)?,
        application: row.get(6)?,
        warnings: row.get(7)?,
    })
}

fn has_secret_prefix(id: &str) -> bool {
    id.get(..SECRET_ID_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SECRET_ID_PREFIX))
}
