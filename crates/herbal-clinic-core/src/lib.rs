//! Herbal Clinic Core Library
//!
//! Clinical record store for a traditional-medicine practice: customers,
//! visits with their prescriptions, and the formula / herb / secret formula
//! reference catalogs.
//!
//! # Architecture
//!
//! ```text
//!                      Presentation layer (desktop UI)
//!                                   │
//!                                   ▼
//!        ┌────────────────┬──────────────────┬──────────────────┐
//!        │ PartyDirectory │      Ledger      │     Catalog      │
//!        │  customers and │ visit + lines in │ formulas, herbs, │
//!        │  search        │ one unit of work │ secret formulas  │
//!        └────────┬───────┴─────────┬────────┴────────┬─────────┘
//!                 └─────────────────┼─────────────────┘
//!                                   ▼
//!                       Session (one connection)
//!                                   │
//!                                   ▼
//!                            SQLite store
//! ```
//!
//! Catalog entries are copied by value into prescription lines, so editing
//! a catalog never rewrites history.
//!
//! # Modules
//!
//! - [`db`]: connection gateway, schema, error taxonomy
//! - [`models`]: domain types (Party, Visit, PrescriptionDraft, CatalogEntry, etc.)
//! - [`directory`]: customer records and search
//! - [`ledger`]: visits and prescription lines
//! - [`catalog`]: reference catalogs
//! - [`config`]: the connection settings document
//! - [`civil`]: civil-era year conversion for the presentation boundary

pub mod catalog;
pub mod civil;
pub mod config;
pub mod db;
pub mod directory;
pub mod ledger;
pub mod models;

// Re-export commonly used types
pub use catalog::Catalog;
pub use config::{ConfigError, ConfigUpdate, DatabaseConfig};
pub use db::{ConnectFailure, ConnectionInfo, DbError, DbResult, Session};
pub use directory::PartyDirectory;
pub use ledger::{Ledger, DEFAULT_RECENT_VISITS};
pub use models::{
    BirthdayQuery, CarryForward, CatalogEntry, CatalogItemRef, CatalogKind, DatedLine, Gender,
    InfoSection, LineDraft, Party, PartyProfile, PrescriptionDraft, PrescriptionLine, SearchKind,
    Upsert, Visit,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<DbError> for ClinicError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Connection { .. } => ClinicError::ConnectionError(e.to_string()),
            DbError::Query(_) => ClinicError::QueryError(e.to_string()),
            DbError::Storage(_) => ClinicError::StorageError(e.to_string()),
            DbError::Validation(msg) => ClinicError::ValidationError(msg),
            DbError::NotFound(what) => ClinicError::NotFound(what),
        }
    }
}

impl From<ConfigError> for ClinicError {
    fn from(e: ConfigError) -> Self {
        ClinicError::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::StorageError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Load (or create) the configuration document and connect.
///
/// A connection failure here is fatal to startup; the error carries the
/// full diagnostic.
#[uniffi::export]
pub fn open_clinic(config_path: String) -> Result<Arc<ClinicCore>, ClinicError> {
    let path = Path::new(&config_path);
    let config = DatabaseConfig::load_or_create(path)?;
    let session = Session::new(config, &config::document_dir(path));
    if let Err(err) = session.connect() {
        let message = session.diagnose(&err);
        tracing::error!(error = %err, "cannot open clinic store");
        return Err(ClinicError::ConnectionError(message));
    }
    Ok(Arc::new(ClinicCore {
        session: Arc::new(Mutex::new(session)),
    }))
}

/// Create an in-memory clinic store (for testing).
#[uniffi::export]
pub fn open_clinic_in_memory() -> Result<Arc<ClinicCore>, ClinicError> {
    let session = Session::open_in_memory()?;
    Ok(Arc::new(ClinicCore {
        session: Arc::new(Mutex::new(session)),
    }))
}

/// Create an empty prescription composer.
#[uniffi::export]
pub fn new_prescription_composer() -> Arc<PrescriptionComposer> {
    Arc::new(PrescriptionComposer {
        draft: Mutex::new(PrescriptionDraft::new()),
    })
}

/// Text of one detail section of a catalog entry.
#[uniffi::export]
pub fn catalog_entry_section(entry: FfiCatalogEntry, section: FfiInfoSection) -> String {
    CatalogEntry::from(entry).section(section.into()).to_string()
}

#[uniffi::export]
pub fn calendar_to_civil_year(calendar_year: i32) -> i32 {
    civil::to_civil_year(calendar_year)
}

#[uniffi::export]
pub fn civil_to_calendar_year(civil_year: i32) -> i32 {
    civil::from_civil_year(civil_year)
}

/// Calendar date (`YYYY-MM-DD`) for civil-era form fields; `None` when any
/// part is zero.
#[uniffi::export]
pub fn civil_date_to_iso(civil_year: u32, month: u32, day: u32) -> Result<Option<String>, ClinicError> {
    let date = civil::civil_date(civil_year, month, day)?;
    Ok(date.map(|d| d.format(DATE_FORMAT).to_string()))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe store wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    session: Arc<Mutex<Session>>,
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Session Operations
    // =========================================================================

    pub fn connection_info(&self) -> Result<FfiConnectionInfo, ClinicError> {
        let session = self.session.lock()?;
        Ok(session.connection_info().into())
    }

    /// Try a separate connection with the current settings.
    pub fn test_connection(&self) -> Result<(), ClinicError> {
        let session = self.session.lock()?;
        session
            .test_connection()
            .map_err(|err| ClinicError::ConnectionError(session.diagnose(&err)))
    }

    /// Close the connection; the next call reopens it.
    pub fn disconnect(&self) -> Result<(), ClinicError> {
        let session = self.session.lock()?;
        session.disconnect();
        Ok(())
    }

    // =========================================================================
    // Party Operations
    // =========================================================================

    pub fn list_parties(&self) -> Result<Vec<FfiParty>, ClinicError> {
        let session = self.session.lock()?;
        let parties = PartyDirectory::new(&session).list_all()?;
        Ok(parties.into_iter().map(|p| p.into()).collect())
    }

    pub fn search_parties(
        &self,
        kind: FfiSearchKind,
        text: String,
    ) -> Result<Vec<FfiParty>, ClinicError> {
        let session = self.session.lock()?;
        let parties = PartyDirectory::new(&session).search(kind.into(), &text)?;
        Ok(parties.into_iter().map(|p| p.into()).collect())
    }

    /// Insert (no id) or update (with id); returns the party id.
    pub fn save_party(&self, party: FfiParty) -> Result<i64, ClinicError> {
        let party = Party::try_from(party)?;
        let session = self.session.lock()?;
        Ok(PartyDirectory::new(&session).save(&party)?)
    }

    pub fn fetch_party(&self, id: i64) -> Result<FfiPartyProfile, ClinicError> {
        let session = self.session.lock()?;
        let profile = PartyDirectory::new(&session).fetch(id)?;
        Ok(profile.into())
    }

    /// Delete a party with all of its visits.
    pub fn delete_party(&self, id: i64) -> Result<bool, ClinicError> {
        let session = self.session.lock()?;
        Ok(PartyDirectory::new(&session).delete(id)?)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Store a visit with its prescription lines; returns the visit id.
    pub fn store_visit(
        &self,
        party_id: i64,
        lines: Vec<FfiLineDraft>,
        amount: Option<f64>,
        complaint: String,
        judgment: String,
    ) -> Result<i64, ClinicError> {
        let lines: Vec<LineDraft> = lines.into_iter().map(|l| l.into()).collect();
        let session = self.session.lock()?;
        Ok(Ledger::new(&session).store_visit(party_id, &lines, amount, &complaint, &judgment)?)
    }

    /// Store the composer's lines as a new visit and clear the composer.
    pub fn store_composed_visit(
        &self,
        party_id: i64,
        composer: Arc<PrescriptionComposer>,
        amount: Option<f64>,
        complaint: String,
        judgment: String,
    ) -> Result<i64, ClinicError> {
        let mut draft = composer.draft.lock()?;
        let session = self.session.lock()?;
        let visit_id =
            Ledger::new(&session).store_visit(party_id, draft.lines(), amount, &complaint, &judgment)?;
        draft.clear();
        Ok(visit_id)
    }

    pub fn load_visits(&self, party_id: i64) -> Result<Vec<FfiVisit>, ClinicError> {
        let session = self.session.lock()?;
        let visits = Ledger::new(&session).load_visits(party_id)?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }

    /// Newest visits of a party (20 when no limit is given).
    pub fn recent_visits(
        &self,
        party_id: i64,
        limit: Option<u32>,
    ) -> Result<Vec<FfiVisit>, ClinicError> {
        let session = self.session.lock()?;
        let visits = Ledger::new(&session)
            .recent_visits(party_id, limit.unwrap_or(DEFAULT_RECENT_VISITS))?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }

    pub fn count_visits(&self, party_id: i64) -> Result<u32, ClinicError> {
        let session = self.session.lock()?;
        Ok(Ledger::new(&session).count_visits(party_id)?)
    }

    pub fn load_lines_for_visit(&self, visit_id: i64) -> Result<Vec<FfiLine>, ClinicError> {
        let session = self.session.lock()?;
        let lines = Ledger::new(&session).load_lines_for_visit(visit_id)?;
        Ok(lines.into_iter().map(|l| l.into()).collect())
    }

    pub fn load_latest_lines(&self, party_id: i64) -> Result<Vec<FfiDatedLine>, ClinicError> {
        let session = self.session.lock()?;
        let lines = Ledger::new(&session).load_latest_lines(party_id)?;
        Ok(lines.into_iter().map(|l| l.into()).collect())
    }

    pub fn delete_visit(&self, visit_id: i64) -> Result<bool, ClinicError> {
        let session = self.session.lock()?;
        Ok(Ledger::new(&session).delete_visit(visit_id)?)
    }

    /// Merge a previous visit's lines into the composer. Returns false when
    /// that visit has nothing to copy.
    pub fn carry_forward_into(
        &self,
        composer: Arc<PrescriptionComposer>,
        source_visit_id: i64,
    ) -> Result<bool, ClinicError> {
        let carried = {
            let session = self.session.lock()?;
            Ledger::new(&session).carry_forward(source_visit_id)?
        };
        Ok(composer.draft.lock()?.absorb(carried))
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    pub fn list_catalog(&self, kind: FfiCatalogKind) -> Result<Vec<FfiCatalogEntry>, ClinicError> {
        let session = self.session.lock()?;
        let entries = Catalog::new(&session, kind.into()).list_all()?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }

    pub fn find_catalog_entry(
        &self,
        kind: FfiCatalogKind,
        id: String,
    ) -> Result<Option<FfiCatalogEntry>, ClinicError> {
        let session = self.session.lock()?;
        let entry = Catalog::new(&session, kind.into()).find_by_id(&id)?;
        Ok(entry.map(|e| e.into()))
    }

    /// Entries whose id or name contains `text`.
    pub fn search_catalog(
        &self,
        kind: FfiCatalogKind,
        text: String,
    ) -> Result<Vec<FfiCatalogEntry>, ClinicError> {
        let session = self.session.lock()?;
        let entries = Catalog::new(&session, kind.into()).search(&text)?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }

    pub fn save_catalog_entry(
        &self,
        kind: FfiCatalogKind,
        entry: FfiCatalogEntry,
    ) -> Result<FfiUpsert, ClinicError> {
        let session = self.session.lock()?;
        let outcome = Catalog::new(&session, kind.into()).save(&entry.into())?;
        Ok(outcome.into())
    }

    pub fn delete_catalog_entry(&self, kind: FfiCatalogKind, id: String) -> Result<bool, ClinicError> {
        let session = self.session.lock()?;
        Ok(Catalog::new(&session, kind.into()).delete(&id)?)
    }

    /// Add a catalog item to the composer, merging by name.
    pub fn add_catalog_item(
        &self,
        composer: Arc<PrescriptionComposer>,
        kind: FfiCatalogKind,
        id: String,
        quantity: u32,
    ) -> Result<(), ClinicError> {
        let item = match kind {
            FfiCatalogKind::Formula => CatalogItemRef::Formula(id),
            FfiCatalogKind::Herb => CatalogItemRef::Herb(id),
            FfiCatalogKind::Secret => CatalogItemRef::Secret(id),
        };
        let line = {
            let session = self.session.lock()?;
            Catalog::line_for(&session, &item, quantity)?
        };
        composer.draft.lock()?.add(line);
        Ok(())
    }
}

// =========================================================================
// Prescription Composer
// =========================================================================

/// An in-progress prescription held for the presentation layer.
#[derive(uniffi::Object)]
pub struct PrescriptionComposer {
    draft: Mutex<PrescriptionDraft>,
}

#[uniffi::export]
impl PrescriptionComposer {
    /// Add a line, merging into an existing line of the same name.
    pub fn add(&self, line: FfiLineDraft) -> Result<(), ClinicError> {
        self.draft.lock()?.add(line.into());
        Ok(())
    }

    pub fn lines(&self) -> Result<Vec<FfiLineDraft>, ClinicError> {
        let draft = self.draft.lock()?;
        Ok(draft.lines().iter().cloned().map(|l| l.into()).collect())
    }

    pub fn remove(&self, index: u32) -> Result<bool, ClinicError> {
        Ok(self.draft.lock()?.remove(index as usize).is_some())
    }

    pub fn set_quantity(&self, index: u32, quantity: u32) -> Result<bool, ClinicError> {
        Ok(self.draft.lock()?.set_quantity(index as usize, quantity))
    }

    pub fn clear(&self) -> Result<(), ClinicError> {
        self.draft.lock()?.clear();
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool, ClinicError> {
        Ok(self.draft.lock()?.is_empty())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConnectionInfo {
    pub host: String,
    pub database: String,
    pub user: String,
    pub port: u16,
    pub charset: String,
    pub connected: bool,
}

impl From<ConnectionInfo> for FfiConnectionInfo {
    fn from(info: ConnectionInfo) -> Self {
        Self {
            host: info.host,
            database: info.database,
            user: info.user,
            port: info.port,
            charset: info.charset,
            connected: info.connected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiGender {
    Male,
    Female,
}

impl From<Gender> for FfiGender {
    fn from(g: Gender) -> Self {
        match g {
            Gender::Male => FfiGender::Male,
            Gender::Female => FfiGender::Female,
        }
    }
}

impl From<FfiGender> for Gender {
    fn from(g: FfiGender) -> Self {
        match g {
            FfiGender::Male => Gender::Male,
            FfiGender::Female => Gender::Female,
        }
    }
}

/// A customer; dates as `YYYY-MM-DD`, timestamps as `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiParty {
    pub id: Option<i64>,
    pub name: String,
    pub birthday: Option<String>,
    pub gender: FfiGender,
    pub occupation: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<Party> for FfiParty {
    fn from(p: Party) -> Self {
        Self {
            id: p.id,
            name: p.name,
            birthday: p.birthday.map(|d| d.format(DATE_FORMAT).to_string()),
            gender: p.gender.into(),
            occupation: p.occupation,
            phone: p.phone,
            mobile: p.mobile,
            address: p.address,
            created_at: p.created_at.map(format_datetime),
            updated_at: p.updated_at.map(format_datetime),
        }
    }
}

impl TryFrom<FfiParty> for Party {
    type Error = ClinicError;

    fn try_from(p: FfiParty) -> Result<Self, Self::Error> {
        let birthday = match p.birthday.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| {
                ClinicError::ValidationError(format!("birthday {text} is not YYYY-MM-DD"))
            })?),
        };
        Ok(Self {
            id: p.id,
            name: p.name,
            birthday,
            gender: p.gender.into(),
            occupation: p.occupation,
            phone: p.phone,
            mobile: p.mobile,
            address: p.address,
            created_at: None,
            updated_at: None,
        })
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPartyProfile {
    pub party: FfiParty,
    pub age: Option<u32>,
    pub visit_count: u32,
    pub next_visit_number: u32,
}

impl From<PartyProfile> for FfiPartyProfile {
    fn from(p: PartyProfile) -> Self {
        let next_visit_number = p.next_visit_number();
        Self {
            party: p.party.into(),
            age: p.age,
            visit_count: p.visit_count,
            next_visit_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiSearchKind {
    Name,
    Phone,
    Mobile,
    Birthday,
}

impl From<FfiSearchKind> for SearchKind {
    fn from(k: FfiSearchKind) -> Self {
        match k {
            FfiSearchKind::Name => SearchKind::Name,
            FfiSearchKind::Phone => SearchKind::Phone,
            FfiSearchKind::Mobile => SearchKind::Mobile,
            FfiSearchKind::Birthday => SearchKind::Birthday,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: i64,
    pub party_id: i64,
    pub visited_at: String,
    pub amount: Option<f64>,
    pub complaint: Option<String>,
    pub judgment: Option<String>,
    pub outcome: Option<String>,
    pub ordinal: u32,
}

impl From<Visit> for FfiVisit {
    fn from(v: Visit) -> Self {
        Self {
            id: v.id,
            party_id: v.party_id,
            visited_at: format_datetime(v.visited_at),
            amount: v.amount,
            complaint: v.complaint,
            judgment: v.judgment,
            outcome: v.outcome,
            ordinal: v.ordinal,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLine {
    pub id: i64,
    pub party_id: i64,
    pub visit_id: Option<i64>,
    pub name: String,
    pub composition: String,
    pub quantity: i64,
    pub unit: String,
}

impl From<PrescriptionLine> for FfiLine {
    fn from(l: PrescriptionLine) -> Self {
        Self {
            id: l.id,
            party_id: l.party_id,
            visit_id: l.visit_id,
            name: l.name,
            composition: l.composition,
            quantity: l.quantity,
            unit: l.unit,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDatedLine {
    pub visited_at: Option<String>,
    pub line: FfiLine,
}

impl From<DatedLine> for FfiDatedLine {
    fn from(d: DatedLine) -> Self {
        Self {
            visited_at: d.visited_at.map(format_datetime),
            line: d.line.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiLineDraft {
    pub name: String,
    pub composition: String,
    pub quantity: u32,
    pub unit: String,
}

impl From<LineDraft> for FfiLineDraft {
    fn from(l: LineDraft) -> Self {
        Self {
            name: l.name,
            composition: l.composition,
            quantity: l.quantity,
            unit: l.unit,
        }
    }
}

impl From<FfiLineDraft> for LineDraft {
    fn from(l: FfiLineDraft) -> Self {
        LineDraft::new(l.name, l.composition, l.quantity, l.unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiCatalogKind {
    Formula,
    Herb,
    Secret,
}

impl From<FfiCatalogKind> for CatalogKind {
    fn from(k: FfiCatalogKind) -> Self {
        match k {
            FfiCatalogKind::Formula => CatalogKind::Formula,
            FfiCatalogKind::Herb => CatalogKind::Herb,
            FfiCatalogKind::Secret => CatalogKind::Secret,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiCatalogEntry {
    pub id: String,
    pub name: String,
    pub origin: Option<String>,
    pub composition: Option<String>,
    pub effect: Option<String>,
    pub indication: Option<String>,
    pub application: Option<String>,
    pub warnings: Option<String>,
}

impl From<CatalogEntry> for FfiCatalogEntry {
    fn from(e: CatalogEntry) -> Self {
        Self {
            id: e.id,
            name: e.name,
            origin: e.origin,
            composition: e.composition,
            effect: e.effect,
            indication: e.indication,
            application: e.application,
            warnings: e.warnings,
        }
    }
}

impl From<FfiCatalogEntry> for CatalogEntry {
    fn from(e: FfiCatalogEntry) -> Self {
        Self {
            id: e.id,
            name: e.name,
            origin: e.origin,
            composition: e.composition,
            effect: e.effect,
            indication: e.indication,
            application: e.application,
            warnings: e.warnings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiInfoSection {
    Origin,
    Composition,
    Effect,
    Indication,
    Application,
    Warnings,
}

impl From<FfiInfoSection> for InfoSection {
    fn from(s: FfiInfoSection) -> Self {
        match s {
            FfiInfoSection::Origin => InfoSection::Origin,
            FfiInfoSection::Composition => InfoSection::Composition,
            FfiInfoSection::Effect => InfoSection::Effect,
            FfiInfoSection::Indication => InfoSection::Indication,
            FfiInfoSection::Application => InfoSection::Application,
            FfiInfoSection::Warnings => InfoSection::Warnings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiUpsert {
    Inserted,
    Updated,
}

impl From<Upsert> for FfiUpsert {
    fn from(u: Upsert) -> Self {
        match u {
            Upsert::Inserted => FfiUpsert::Inserted,
            Upsert::Updated => FfiUpsert::Updated,
        }
    }
}

fn format_datetime(at: NaiveDateTime) -> String {
    at.format(DATETIME_FORMAT).to_string()
}
