//! SQLite schema definition.

/// Complete database schema for the clinic store.
pub const SCHEMA: &str = r#"
-- Enable foreign keys (cascading deletes depend on it)
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Customers
-- ============================================================================

CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    birthday TEXT,                               -- YYYY-MM-DD, calendar year
    gender TEXT NOT NULL DEFAULT '男' CHECK (gender IN ('男', '女')),
    occupation TEXT,
    phone TEXT,
    mobile TEXT,
    address TEXT,
    create_date TEXT NOT NULL,                   -- YYYY-MM-DD HH:MM:SS
    update_date TEXT
);

CREATE INDEX IF NOT EXISTS idx_customers_name ON customers(name);

-- ============================================================================
-- Visit records
-- ============================================================================

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    record_date TEXT NOT NULL,                   -- YYYY-MM-DD HH:MM:SS
    price REAL DEFAULT 0,
    description TEXT,                            -- chief complaint
    judgment TEXT,
    result TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_customer ON records(customer_id, record_date);

-- ============================================================================
-- Prescription lines
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    record_id INTEGER REFERENCES records(id) ON DELETE CASCADE,  -- NULL on legacy rows
    prescription_name TEXT NOT NULL,
    composition TEXT,
    quantity INTEGER NOT NULL DEFAULT 1,
    unit TEXT
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_record ON prescriptions(record_id);
CREATE INDEX IF NOT EXISTS idx_prescriptions_customer ON prescriptions(customer_id);

-- ============================================================================
-- Reference catalogs
-- ============================================================================

CREATE TABLE IF NOT EXISTS formulas (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    origin_text TEXT,
    composition TEXT,
    effect TEXT,
    indication TEXT,
    application TEXT,
    warnings_side_effects TEXT
);

-- Single herbs keep their composition slot as nature/flavor
CREATE TABLE IF NOT EXISTS medicines (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    origin_text TEXT,
    nature_flavor TEXT,
    effect TEXT,
    indication TEXT,
    application TEXT,
    warnings_side_effects TEXT
);
"#;

/// Dedicated secret formula table.
///
/// Not part of [`SCHEMA`]: stores that keep secret formulas as `S` rows of
/// `formulas` must not gain an empty table that would hide them.
pub const SECRET_FORMULAS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS secret_formulas (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    origin_text TEXT,
    composition TEXT,
    effect TEXT,
    indication TEXT,
    application TEXT,
    warnings_side_effects TEXT
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(SECRET_FORMULAS_SCHEMA).unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);

        // Idempotent on an existing store
        assert!(conn.execute_batch(SCHEMA).is_ok());

        assert!(conn.execute_batch(SECRET_FORMULAS_SCHEMA).is_ok());
        assert!(conn.execute_batch(SECRET_FORMULAS_SCHEMA).is_ok());
    }

    #[test]
    fn test_blank_name_rejected() {
        let conn = setup_conn();
        let result = conn.execute(
            "INSERT INTO customers (name, create_date) VALUES ('   ', '2024-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_record_requires_customer() {
        let conn = setup_conn();
        let result = conn.execute(
            "INSERT INTO records (customer_id, record_date) VALUES (99, '2024-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cascade_from_customer() {
        let conn = setup_conn();
        conn.execute(
            "INSERT INTO customers (id, name, create_date) VALUES (1, '林', '2024-01-01 00:00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO records (id, customer_id, record_date) VALUES (1, 1, '2024-01-02 10:00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO prescriptions (customer_id, record_id, prescription_name, quantity, unit) VALUES (1, 1, '甘草', 2, '錢')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM customers WHERE id = 1", []).unwrap();

        let records: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap();
        let lines: i64 = conn
            .query_row("SELECT COUNT(*) FROM prescriptions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(records, 0);
        assert_eq!(lines, 0);
    }
}
