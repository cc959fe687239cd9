//! Party directory: customer records and search.

use chrono::Local;
use rusqlite::{params, Row};

use crate::db::{contains_pattern, now_stamp, DbError, DbResult, Session};
use crate::models::{BirthdayQuery, Gender, Party, PartyProfile, SearchKind};

const PARTY_COLUMNS: &str = "id, name, birthday, gender, occupation, phone, mobile, address, create_date, update_date";

/// Create/read/update/delete and search over customers.
pub struct PartyDirectory<'a> {
    session: &'a Session,
}

impl<'a> PartyDirectory<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// All parties ordered by identifier.
    pub fn list_all(&self) -> DbResult<Vec<Party>> {
        self.session.query(
            &format!("SELECT {PARTY_COLUMNS} FROM customers ORDER BY id"),
            [],
            party_from_row,
        )
    }

    /// Filter parties by one field. Blank text lists everyone.
    ///
    /// Name, phone and mobile match substrings. Birthday text is parsed by
    /// [`BirthdayQuery::parse`]; text it rejects is a validation error and
    /// nothing is queried.
    pub fn search(&self, kind: SearchKind, text: &str) -> DbResult<Vec<Party>> {
        let text = text.trim();
        if text.is_empty() {
            return self.list_all();
        }

        let column = match kind {
            SearchKind::Name => "name",
            SearchKind::Phone => "phone",
            SearchKind::Mobile => "mobile",
            SearchKind::Birthday => return self.search_birthday(text),
        };

        self.session.query(
            &format!(
                r#"SELECT {PARTY_COLUMNS} FROM customers
                   WHERE {column} LIKE ?1 ESCAPE '\'
                   ORDER BY id"#
            ),
            [contains_pattern(text)],
            party_from_row,
        )
    }

    fn search_birthday(&self, text: &str) -> DbResult<Vec<Party>> {
        let query = BirthdayQuery::parse(text).ok_or_else(|| {
            DbError::validation(format!(
                "birthday search \"{text}\" is not a year, month/day or month"
            ))
        })?;
        tracing::debug!(?query, "birthday search");

        let year = "CAST(strftime('%Y', birthday) AS INTEGER)";
        let month = "CAST(strftime('%m', birthday) AS INTEGER)";
        let day = "CAST(strftime('%d', birthday) AS INTEGER)";

        match query {
            BirthdayQuery::Year(y) => self.session.query(
                &format!("SELECT {PARTY_COLUMNS} FROM customers WHERE {year} = ?1 ORDER BY id"),
                [y],
                party_from_row,
            ),
            BirthdayQuery::MonthDay { month: m, day: d } => self.session.query(
                &format!(
                    "SELECT {PARTY_COLUMNS} FROM customers WHERE {month} = ?1 AND {day} = ?2 ORDER BY id"
                ),
                [m, d],
                party_from_row,
            ),
            BirthdayQuery::Month(m) => self.session.query(
                &format!("SELECT {PARTY_COLUMNS} FROM customers WHERE {month} = ?1 ORDER BY id"),
                [m],
                party_from_row,
            ),
        }
    }

    /// Insert a party without an id, update one with an id.
    ///
    /// Returns the party's identifier. Updating an id that is not stored is
    /// `NotFound`.
    pub fn save(&self, party: &Party) -> DbResult<i64> {
        let name = party.name.trim();
        if name.is_empty() {
            return Err(DbError::validation("customer name must not be empty"));
        }
        let now = now_stamp();

        match party.id {
            None => {
                self.session.execute(
                    r#"
                    INSERT INTO customers (
                        name, birthday, gender, occupation, phone, mobile, address, create_date
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    params![
                        name,
                        party.birthday,
                        party.gender.as_str(),
                        party.occupation,
                        party.phone,
                        party.mobile,
                        party.address,
                        now,
                    ],
                )?;
                let id = self.session.last_insert_id()?;
                tracing::info!(party_id = id, "customer created");
                Ok(id)
            }
            Some(id) => {
                let rows = self.session.execute(
                    r#"
                    UPDATE customers SET
                        name = ?2,
                        birthday = ?3,
                        gender = ?4,
                        occupation = ?5,
                        phone = ?6,
                        mobile = ?7,
                        address = ?8,
                        update_date = ?9
                    WHERE id = ?1
                    "#,
                    params![
                        id,
                        name,
                        party.birthday,
                        party.gender.as_str(),
                        party.occupation,
                        party.phone,
                        party.mobile,
                        party.address,
                        now,
                    ],
                )?;
                if rows == 0 {
                    return Err(DbError::NotFound(format!("customer {id}")));
                }
                tracing::info!(party_id = id, "customer updated");
                Ok(id)
            }
        }
    }

    /// One party with its age and visit count.
    pub fn fetch(&self, id: i64) -> DbResult<PartyProfile> {
        let party = self
            .session
            .query_opt(
                &format!("SELECT {PARTY_COLUMNS} FROM customers WHERE id = ?1"),
                [id],
                party_from_row,
            )?
            .ok_or_else(|| DbError::NotFound(format!("customer {id}")))?;

        let visit_count = self
            .session
            .query_opt(
                "SELECT COUNT(*) FROM records WHERE customer_id = ?1",
                [id],
                |row| row.get::<_, u32>(0),
            )?
            .unwrap_or(0);

        let age = party.age_on(Local::now().date_naive());
        Ok(PartyProfile {
            party,
            age,
            visit_count,
        })
    }

    /// Delete a party. Its visits and prescription lines go with it.
    pub fn delete(&self, id: i64) -> DbResult<bool> {
        let rows = self
            .session
            .execute("DELETE FROM customers WHERE id = ?1", [id])?;
        if rows > 0 {
            tracing::info!(party_id = id, "customer deleted");
        }
        Ok(rows > 0)
    }
}

fn party_from_row(row: &Row<'_>) -> rusqlite::Result<Party> {
    let gender: Option<String> = row.get(3)?;
    Ok(Party {
        id: row.get(0)?,
        name: row.get(1)?,
        birthday: row.get(2)?,
        gender: gender
            .as_deref()
            .and_then(Gender::parse)
            .unwrap_or_default(),
        occupation: row.get(4)?,
        phone: row.get(5)?,
        mobile: row.get(6)?,
        address: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn setup_db() -> Session {
        Session::open_in_memory().unwrap()
    }

    fn party(name: &str, birthday: Option<(i32, u32, u32)>) -> Party {
        let mut party = Party::new(name);
        party.birthday = birthday.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        party
    }

    #[test]
    fn test_insert_and_fetch() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        let mut new_party = party("陳大文", Some((1994, 5, 20)));
        new_party.gender = Gender::Female;
        new_party.mobile = Some("0912345678".into());
        let id = directory.save(&new_party).unwrap();

        let profile = directory.fetch(id).unwrap();
        assert_eq!(profile.party.id, Some(id));
        assert_eq!(profile.party.name, "陳大文");
        assert_eq!(profile.party.gender, Gender::Female);
        assert_eq!(profile.party.birthday, NaiveDate::from_ymd_opt(1994, 5, 20));
        assert!(profile.party.created_at.is_some());
        assert!(profile.party.updated_at.is_none());
        assert_eq!(profile.visit_count, 0);
        assert_eq!(profile.next_visit_number(), 1);
        assert!(profile.age.is_some());
    }

    #[test]
    fn test_update_stamps_update_date() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        let id = directory.save(&party("林", None)).unwrap();
        let mut stored = directory.fetch(id).unwrap().party;
        stored.phone = Some("02-2345-6789".into());
        assert_eq!(directory.save(&stored).unwrap(), id);

        let updated = directory.fetch(id).unwrap().party;
        assert_eq!(updated.phone.as_deref(), Some("02-2345-6789"));
        assert!(updated.updated_at.is_some());
        assert_eq!(directory.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_name_rejected() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        let err = directory.save(&party("   ", None)).unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        assert!(directory.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_update_missing_id_is_not_found() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        let mut ghost = party("林", None);
        ghost.id = Some(42);
        assert!(matches!(directory.save(&ghost), Err(DbError::NotFound(_))));
        assert!(matches!(directory.fetch(42), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_search_by_name_phone_mobile() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        let mut a = party("王小明", None);
        a.phone = Some("02-1111".into());
        let mut b = party("王大明", None);
        b.mobile = Some("0933-222".into());
        directory.save(&a).unwrap();
        directory.save(&b).unwrap();
        directory.save(&party("李四", None)).unwrap();

        assert_eq!(directory.search(SearchKind::Name, "王").unwrap().len(), 2);
        assert_eq!(directory.search(SearchKind::Name, "小明").unwrap().len(), 1);
        assert_eq!(directory.search(SearchKind::Phone, "1111").unwrap().len(), 1);
        assert_eq!(directory.search(SearchKind::Mobile, "222").unwrap().len(), 1);
        assert_eq!(directory.search(SearchKind::Name, "  ").unwrap().len(), 3);
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        directory.save(&party("王小明", None)).unwrap();
        assert!(directory.search(SearchKind::Name, "%").unwrap().is_empty());
        assert!(directory.search(SearchKind::Name, "_").unwrap().is_empty());
    }

    #[test]
    fn test_search_birthday() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        directory.save(&party("甲", Some((1994, 5, 20)))).unwrap();
        directory.save(&party("乙", Some((1994, 11, 3)))).unwrap();
        directory.save(&party("丙", Some((1980, 5, 1)))).unwrap();
        directory.save(&party("丁", None)).unwrap();

        let names = |text: &str| -> Vec<String> {
            directory
                .search(SearchKind::Birthday, text)
                .unwrap()
                .into_iter()
                .map(|p| p.name)
                .collect()
        };

        assert_eq!(names("0083"), vec!["甲", "乙"]);
        assert_eq!(names("5/20"), vec!["甲"]);
        assert_eq!(names("5"), vec!["甲", "丙"]);
        assert!(names("20").is_empty());
    }

    #[test]
    fn test_search_birthday_unparseable() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        let err = directory.search(SearchKind::Birthday, "五月").unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[test]
    fn test_delete() {
        let session = setup_db();
        let directory = PartyDirectory::new(&session);

        let id = directory.save(&party("林", None)).unwrap();
        assert!(directory.delete(id).unwrap());
        assert!(!directory.delete(id).unwrap());
        assert!(directory.list_all().unwrap().is_empty());
    }
}
