use crate::error::{LibraryError, Result};
use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};

/// Date layout used for every date stored in the library file.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>, // free text, as typed into the form
    pub year_published: Option<i64>,
    pub publisher_id: Option<i64>,
    pub category: Option<String>,
    pub copies_available: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub registration_date: Option<String>,
}

/// A loan is open until its return is processed; the return closes it for good.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    Open,
    Closed,
}

impl LoanState {
    /// Closed loans are exactly the ones with a fine recorded.
    pub fn from_fine(fine: Option<f64>) -> Self {
        if fine.is_some() {
            LoanState::Closed
        } else {
            LoanState::Open
        }
    }
}

impl std::fmt::Display for LoanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanState::Open => write!(f, "open"),
            LoanState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: i64,
    pub member_id: Option<i64>,
    pub member_name: Option<String>,
    pub book_id: Option<i64>,
    pub book_title: Option<String>,
    pub borrow_date: Option<String>,
    /// Due date while open, actual return date once closed.
    pub return_date: Option<String>,
    pub fine: Option<f64>,
    pub state: LoanState,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReturnReceipt {
    pub loan_id: i64,
    pub due_date: NaiveDate,
    pub returned_on: NaiveDate,
    pub days_late: i64,
    pub fine: f64,
}

// Raw form input. Every field arrives as a possibly empty string.

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BookForm {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: String,
    pub year: String,
    pub category: String,
    pub copies: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MemberForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PublisherForm {
    pub name: String,
    pub address: String,
    pub contact_number: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CheckoutForm {
    pub member_id: String,
    pub book_id: String,
    pub borrow_date: String,
    pub due_date: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReturnForm {
    pub member_id: String,
    pub book_id: String,
    pub return_date: String,
}

// Validated requests, built from the forms above.

#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: Option<String>,
    pub year_published: Option<i64>,
    pub category: Option<String>,
    pub copies_available: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPublisher {
    pub name: String,
    pub address: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkout {
    pub member_id: i64,
    pub book_id: i64,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnRequest {
    pub member_id: i64,
    pub book_id: i64,
    pub returned_on: NaiveDate,
}

impl TryFrom<BookForm> for NewBook {
    type Error = LibraryError;

    fn try_from(form: BookForm) -> Result<Self> {
        let title = required(&form.title, "title")?;
        let author = required(&form.author, "author")?;
        let isbn = required(&form.isbn, "ISBN")?;
        let copies = required(&form.copies, "copies available")?;
        let copies_available = whole_number(&copies, "Copies available")?;
        if copies_available < 0 {
            return Err(LibraryError::Validation(
                "Copies available cannot be negative.".to_string(),
            ));
        }
        let year_published = match non_empty(&form.year) {
            Some(year) => Some(whole_number(&year, "Year published")?),
            None => None,
        };

        Ok(NewBook {
            title,
            author,
            isbn,
            publisher: non_empty(&form.publisher),
            year_published,
            category: non_empty(&form.category),
            copies_available,
        })
    }
}

impl TryFrom<MemberForm> for NewMember {
    type Error = LibraryError;

    fn try_from(form: MemberForm) -> Result<Self> {
        Ok(NewMember {
            name: required(&form.name, "name")?,
            email: required(&form.email, "email")?,
            phone: required(&form.phone, "phone")?,
            address: non_empty(&form.address),
        })
    }
}

impl TryFrom<PublisherForm> for NewPublisher {
    type Error = LibraryError;

    fn try_from(form: PublisherForm) -> Result<Self> {
        Ok(NewPublisher {
            name: required(&form.name, "publisher name")?,
            address: non_empty(&form.address),
            contact_number: non_empty(&form.contact_number),
        })
    }
}

impl TryFrom<CheckoutForm> for Checkout {
    type Error = LibraryError;

    fn try_from(form: CheckoutForm) -> Result<Self> {
        let member_id = required(&form.member_id, "member ID")?;
        let book_id = required(&form.book_id, "book ID")?;
        let borrow_date = required(&form.borrow_date, "borrow date")?;
        let due_date = required(&form.due_date, "return date")?;

        let checkout = Checkout {
            member_id: whole_number(&member_id, "Member ID")?,
            book_id: whole_number(&book_id, "Book ID")?,
            borrow_date: parse_date(&borrow_date, "borrow date")?,
            due_date: parse_date(&due_date, "return date")?,
        };
        if checkout.due_date < checkout.borrow_date {
            return Err(LibraryError::Validation(
                "Return date cannot be before the borrow date.".to_string(),
            ));
        }
        Ok(checkout)
    }
}

impl TryFrom<ReturnForm> for ReturnRequest {
    type Error = LibraryError;

    fn try_from(form: ReturnForm) -> Result<Self> {
        let member_id = required(&form.member_id, "member ID")?;
        let book_id = required(&form.book_id, "book ID")?;
        let return_date = required(&form.return_date, "return date")?;

        Ok(ReturnRequest {
            member_id: whole_number(&member_id, "Member ID")?,
            book_id: whole_number(&book_id, "Book ID")?,
            returned_on: parse_date(&return_date, "return date")?,
        })
    }
}

/// Parse a `YYYY-MM-DD` date, reporting a format error naming `field`.
pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| LibraryError::bad_date(field, value.trim()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn required(value: &str, field: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| LibraryError::required(field))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn whole_number(value: &str, field: &str) -> Result<i64> {
    value.parse::<i64>().map_err(|_| {
        LibraryError::Validation(format!("{} must be a whole number, got '{}'.", field, value))
    })
}

/// Read an INTEGER column that older files may hold as text or blank.
pub(crate) fn lenient_int(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(value) => Some(value),
        ValueRef::Real(value) => Some(value as i64),
        ValueRef::Text(raw) => std::str::from_utf8(raw)
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}

/// Read a TEXT column, treating an empty string like NULL.
pub(crate) fn optional_text(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(raw) => {
            let text = String::from_utf8_lossy(raw);
            if text.trim().is_empty() {
                None
            } else {
                Some(text.into_owned())
            }
        }
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) => Some(value.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}
