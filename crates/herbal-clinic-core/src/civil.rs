//! Civil-era (民國) year conversion.
//!
//! The store always holds calendar years. These helpers are for the
//! presentation boundary, where dates are typed and shown in civil-era years.

use chrono::{Datelike, NaiveDate};

use crate::db::{DbError, DbResult};

/// Calendar year = civil-era year + 1911.
pub const CIVIL_YEAR_OFFSET: i32 = 1911;

pub fn to_civil_year(calendar_year: i32) -> i32 {
    calendar_year - CIVIL_YEAR_OFFSET
}

pub fn from_civil_year(civil_year: i32) -> i32 {
    civil_year + CIVIL_YEAR_OFFSET
}

/// Build a calendar date from civil-era parts as entered on a form.
///
/// Any zero part means "not given" and yields `None`; a date that does not
/// exist is a validation error.
pub fn civil_date(civil_year: u32, month: u32, day: u32) -> DbResult<Option<NaiveDate>> {
    if civil_year == 0 || month == 0 || day == 0 {
        return Ok(None);
    }
    let year = i32::try_from(civil_year)
        .map(from_civil_year)
        .map_err(|_| DbError::validation(format!("civil year {civil_year} is out of range")))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .map(Some)
        .ok_or_else(|| {
            DbError::validation(format!("{civil_year}/{month}/{day} is not a valid date"))
        })
}

/// Split a calendar date into civil-era (year, month, day).
pub fn civil_parts(date: NaiveDate) -> (i32, u32, u32) {
    (to_civil_year(date.year()), date.month(), date.day())
}
