//! Customer (party) models.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::civil::CIVIL_YEAR_OFFSET;

/// Customer gender, stored as the single characters used on paper records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "男",
            Gender::Female => "女",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "男" => Some(Gender::Male),
            "女" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// A customer record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Party {
    /// Server-assigned on first save; `None` until then
    pub id: Option<i64>,
    /// Customer name (never blank)
    pub name: String,
    /// Birthday in calendar years
    pub birthday: Option<NaiveDate>,
    pub gender: Gender,
    pub occupation: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    /// Set by the store on insert
    pub created_at: Option<NaiveDateTime>,
    /// Set by the store on update
    pub updated_at: Option<NaiveDateTime>,
}

impl Party {
    /// Create an unsaved party with required fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            birthday: None,
            gender: Gender::Male,
            occupation: None,
            phone: None,
            mobile: None,
            address: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Whole years of age on `today`; `None` without a birthday or for a
    /// birthday in the future.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let birthday = self.birthday?;
        let mut age = today.year() - birthday.year();
        if (today.month(), today.day()) < (birthday.month(), birthday.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }
}

/// A party with fields computed from its visit history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartyProfile {
    pub party: Party,
    pub age: Option<u32>,
    pub visit_count: u32,
}

impl PartyProfile {
    /// Sequence number the next stored visit will get.
    pub fn next_visit_number(&self) -> u32 {
        self.visit_count + 1
    }
}

/// Field a directory search filters on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SearchKind {
    #[default]
    Name,
    Phone,
    Mobile,
    Birthday,
}

/// A parsed birthday search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BirthdayQuery {
    /// Calendar birth year
    Year(i32),
    /// Birth month and day
    MonthDay { month: i32, day: i32 },
    /// Birth month only
    Month(i32),
}

impl BirthdayQuery {
    /// Interpret search text, in priority order, as:
    ///
    /// 1. exactly four ASCII digits: a civil-era year, converted to calendar;
    /// 2. text containing `/`: exactly two integers, month then day;
    /// 3. a bare integer month.
    ///
    /// Full-width digits are read as their ASCII counterparts. Ranges are
    /// not checked: `"20"` is month 20 and simply matches nothing.
    pub fn parse(text: &str) -> Option<Self> {
        let text = fold_full_width_digits(text.trim());
        let text = text.as_str();

        if text.chars().count() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
            let civil: i32 = text.parse().ok()?;
            return Some(BirthdayQuery::Year(civil + CIVIL_YEAR_OFFSET));
        }

        if text.contains('/') {
            let parts: Vec<&str> = text.split('/').collect();
            if parts.len() != 2 {
                return None;
            }
            let month = parts[0].trim().parse().ok()?;
            let day = parts[1].trim().parse().ok()?;
            return Some(BirthdayQuery::MonthDay { month, day });
        }

        text.parse().ok().map(BirthdayQuery::Month)
    }
}

/// Map full-width digits (U+FF10 to U+FF19) to ASCII.
fn fold_full_width_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF10}'..='\u{FF19}' => char::from(b'0' + (c as u32 - 0xFF10) as u8),
            _ => c,
        })
        .collect()
}
