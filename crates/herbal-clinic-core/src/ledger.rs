//! Visit and prescription ledger.
//!
//! A visit and its prescription lines are written together in one unit of
//! work: either all of them are stored or none are.

use chrono::NaiveDateTime;
use rusqlite::{params, Row};

use crate::db::{now_stamp, DbError, DbResult, Session};
use crate::models::{CarryForward, DatedLine, LineDraft, PrescriptionLine, Visit};

/// Rows shown in the visit history panel by default.
pub const DEFAULT_RECENT_VISITS: u32 = 20;

const VISIT_SELECT: &str = r#"
    SELECT id, customer_id, record_date, price, description, judgment, result,
           ROW_NUMBER() OVER (ORDER BY record_date, id) AS ordinal
    FROM records
    WHERE customer_id = ?1
    ORDER BY record_date DESC, id DESC
"#;

const LINE_COLUMNS: &str =
    "id, customer_id, record_id, prescription_name, composition, quantity, unit";

/// Stores and reads visits with their prescription lines.
pub struct Ledger<'a> {
    session: &'a Session,
}

impl<'a> Ledger<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Store a visit stamped with the current time together with its lines.
    ///
    /// `lines` must be non-empty; lines are stored in the given order. A
    /// missing `amount` is stored as 0.
    pub fn store_visit(
        &self,
        party_id: i64,
        lines: &[LineDraft],
        amount: Option<f64>,
        complaint: &str,
        judgment: &str,
    ) -> DbResult<i64> {
        if lines.is_empty() {
            return Err(DbError::validation("a prescription needs at least one line"));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(DbError::validation(format!(
                "quantity for {} must be at least 1",
                line.name
            )));
        }

        let visited_at = now_stamp();
        let visit_id = self.session.transaction(|unit| {
            unit.execute(
                r#"
                INSERT INTO records (customer_id, record_date, price, description, judgment)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![party_id, visited_at, amount.unwrap_or(0.0), complaint, judgment],
            )?;
            let visit_id = unit.last_insert_id();

            for line in lines {
                unit.execute(
                    r#"
                    INSERT INTO prescriptions (
                        customer_id, record_id, prescription_name, composition, quantity, unit
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        party_id,
                        visit_id,
                        line.name,
                        line.composition,
                        line.quantity,
                        line.unit
                    ],
                )?;
            }
            Ok(visit_id)
        })?;

        tracing::info!(party_id, visit_id, lines = lines.len(), "visit stored");
        Ok(visit_id)
    }

    /// A party's visits, newest first.
    pub fn load_visits(&self, party_id: i64) -> DbResult<Vec<Visit>> {
        self.session.query(VISIT_SELECT, [party_id], visit_from_row)
    }

    /// The newest `limit` visits of a party.
    pub fn recent_visits(&self, party_id: i64, limit: u32) -> DbResult<Vec<Visit>> {
        self.session.query(
            &format!("{VISIT_SELECT} LIMIT ?2"),
            params![party_id, limit],
            visit_from_row,
        )
    }

    pub fn count_visits(&self, party_id: i64) -> DbResult<u32> {
        let count = self.session.query_opt(
            "SELECT COUNT(*) FROM records WHERE customer_id = ?1",
            [party_id],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count.unwrap_or(0))
    }

    /// Lines of one visit in insertion order.
    ///
    /// A visit with no linked lines may still own rows written before lines
    /// carried a visit id. Those unlinked rows are attributed to the visit
    /// only when it is the party's single visit on that calendar day.
    pub fn load_lines_for_visit(&self, visit_id: i64) -> DbResult<Vec<PrescriptionLine>> {
        let lines = self.session.query(
            &format!("SELECT {LINE_COLUMNS} FROM prescriptions WHERE record_id = ?1 ORDER BY id"),
            [visit_id],
            line_from_row,
        )?;
        if !lines.is_empty() {
            return Ok(lines);
        }
        self.unlinked_lines_for_visit(visit_id)
    }

    fn unlinked_lines_for_visit(&self, visit_id: i64) -> DbResult<Vec<PrescriptionLine>> {
        let visit = self.session.query_opt(
            "SELECT customer_id, record_date FROM records WHERE id = ?1",
            [visit_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, NaiveDateTime>(1)?)),
        )?;
        let Some((party_id, visited_at)) = visit else {
            return Ok(Vec::new());
        };

        let same_day = self
            .session
            .query_opt(
                "SELECT COUNT(*) FROM records WHERE customer_id = ?1 AND date(record_date) = ?2",
                params![party_id, visited_at.date()],
                |row| row.get::<_, u32>(0),
            )?
            .unwrap_or(0);
        if same_day != 1 {
            return Ok(Vec::new());
        }

        let lines = self.session.query(
            &format!(
                "SELECT {LINE_COLUMNS} FROM prescriptions WHERE customer_id = ?1 AND record_id IS NULL ORDER BY id"
            ),
            [party_id],
            line_from_row,
        )?;
        if !lines.is_empty() {
            tracing::debug!(visit_id, lines = lines.len(), "using unlinked legacy lines");
        }
        Ok(lines)
    }

    /// All of a party's lines, the most recent visit's first.
    pub fn load_latest_lines(&self, party_id: i64) -> DbResult<Vec<DatedLine>> {
        self.session.query(
            r#"
            SELECT p.id, p.customer_id, p.record_id, p.prescription_name, p.composition,
                   p.quantity, p.unit, r.record_date
            FROM prescriptions p
            LEFT JOIN records r ON p.record_id = r.id
            WHERE p.customer_id = ?1
            ORDER BY r.record_date DESC, r.id DESC, p.id
            "#,
            [party_id],
            |row| {
                Ok(DatedLine {
                    line: line_from_row(row)?,
                    visited_at: row.get(7)?,
                })
            },
        )
    }

    /// Delete a visit; its lines are removed by the store's cascade.
    pub fn delete_visit(&self, visit_id: i64) -> DbResult<bool> {
        let rows = self
            .session
            .execute("DELETE FROM records WHERE id = ?1", [visit_id])?;
        if rows > 0 {
            tracing::info!(visit_id, "visit deleted");
        }
        Ok(rows > 0)
    }

    /// Copy a previous visit's lines as unsaved drafts.
    pub fn carry_forward(&self, source_visit_id: i64) -> DbResult<CarryForward> {
        let lines = self.load_lines_for_visit(source_visit_id)?;
        if lines.is_empty() {
            return Ok(CarryForward::NoLines);
        }
        Ok(CarryForward::Lines(
            lines.into_iter().map(LineDraft::from).collect(),
        ))
    }
}

fn visit_from_row(row: &Row<'_>) -> rusqlite::Result<Visit> {
    Ok(Visit {
        id: row.get(0)?,
        party_id: row.get(1)?,
        visited_at: row.get(2)?,
        amount: row.get(3)?,
        complaint: row.get(4)?,
        judgment: row.get(5)?,
        outcome: row.get(6)?,
        ordinal: row.get(7)?,
    })
}

fn line_from_row(row: &Row<'_>) -> rusqlite::Result<PrescriptionLine> {
    Ok(PrescriptionLine {
        id: row.get(0)?,
        party_id: row.get(1)?,
        visit_id: row.get(2)?,
        name: row.get(3)?,
        composition: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        quantity: row.get(5)?,
        unit: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    })
}
