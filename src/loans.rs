use crate::db;
use crate::error::{LibraryError, Result};
use crate::models::{
    format_date, lenient_int, optional_text, parse_date, Checkout, CheckoutForm, Loan, LoanState,
    ReturnForm, ReturnReceipt, ReturnRequest,
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use std::path::PathBuf;

/// Charged for every full calendar day a book comes back after its due date.
pub const FINE_PER_DAY: f64 = 0.5;

/// Whole days between the due date and the actual return, never negative.
pub fn days_overdue(due: NaiveDate, returned_on: NaiveDate) -> i64 {
    returned_on.signed_duration_since(due).num_days().max(0)
}

pub fn overdue_fine(due: NaiveDate, returned_on: NaiveDate) -> f64 {
    days_overdue(due, returned_on) as f64 * FINE_PER_DAY
}

/// Checkouts and returns against the `Borrow` table.
#[derive(Debug, Clone)]
pub struct Loans {
    db_path: PathBuf,
}

impl Loans {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Loans {
            db_path: db_path.into(),
        }
    }

    /// Record a new open loan and return its `Transaction_ID`.
    ///
    /// Member and book IDs are taken as given, and the book's available
    /// copies are not touched.
    pub fn checkout(&self, form: CheckoutForm) -> Result<i64> {
        let checkout = Checkout::try_from(form)?;
        let conn = db::open_db(&self.db_path)?;
        conn.execute(
            "INSERT INTO Borrow (Member_ID, Book_ID, Borrow_Date, Return_Date) VALUES (?1, ?2, ?3, ?4)",
            params![
                checkout.member_id,
                checkout.book_id,
                format_date(checkout.borrow_date),
                format_date(checkout.due_date),
            ],
        )?;
        let id = conn.last_insert_rowid();
        log::info!(
            "loan {} opened: member {} book {} due {}",
            id,
            checkout.member_id,
            checkout.book_id,
            checkout.due_date
        );
        Ok(id)
    }

    /// Close the most recent open loan for the member and book, charging any fine.
    pub fn return_book(&self, form: ReturnForm) -> Result<ReturnReceipt> {
        let request = ReturnRequest::try_from(form)?;
        let conn = db::open_db(&self.db_path)?;

        let open: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT Transaction_ID, Return_Date FROM Borrow \
                 WHERE Member_ID = ?1 AND Book_ID = ?2 AND Fine IS NULL \
                 ORDER BY Transaction_ID DESC LIMIT 1",
                params![request.member_id, request.book_id],
                |row| Ok((row.get(0)?, optional_text(row, 1)?)),
            )
            .optional()?;
        let (loan_id, stored_due) = open.ok_or_else(|| {
            LibraryError::NotFound(
                "No open borrowing record found for this member and book.".to_string(),
            )
        })?;
        let stored_due = stored_due.ok_or_else(|| {
            LibraryError::Format(format!("Loan {} has no due date on record.", loan_id))
        })?;
        let due_date = parse_date(&stored_due, "due date on record")?;

        let days_late = days_overdue(due_date, request.returned_on);
        let fine = overdue_fine(due_date, request.returned_on);

        // Date and fine change together, and only while the loan is still open.
        let updated = conn.execute(
            "UPDATE Borrow SET Return_Date = ?1, Fine = ?2 WHERE Transaction_ID = ?3 AND Fine IS NULL",
            params![format_date(request.returned_on), fine, loan_id],
        )?;
        if updated == 0 {
            return Err(LibraryError::NotFound(format!(
                "Loan {} has already been returned.",
                loan_id
            )));
        }

        if days_late > 0 {
            log::warn!(
                "loan {} returned {} day(s) late, fine {:.2}",
                loan_id,
                days_late,
                fine
            );
        } else {
            log::info!("loan {} returned on time", loan_id);
        }

        Ok(ReturnReceipt {
            loan_id,
            due_date,
            returned_on: request.returned_on,
            days_late,
            fine,
        })
    }

    pub fn list_loans(&self) -> Result<Vec<Loan>> {
        let conn = db::open_db(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT Borrow.Transaction_ID, Borrow.Member_ID, Member.Name, Borrow.Book_ID, Book.Title, \
              Borrow.Borrow_Date, Borrow.Return_Date, Borrow.Fine \
             FROM Borrow \
             LEFT JOIN Member ON Borrow.Member_ID = Member.Member_ID \
             LEFT JOIN Book ON Borrow.Book_ID = Book.Book_ID",
        )?;
        let rows = stmt.query_map(params![], |row| {
            let fine: Option<f64> = row.get(7)?;
            Ok(Loan {
                id: row.get(0)?,
                member_id: lenient_int(row, 1)?,
                member_name: optional_text(row, 2)?,
                book_id: lenient_int(row, 3)?,
                book_title: optional_text(row, 4)?,
                borrow_date: optional_text(row, 5)?,
                return_date: optional_text(row, 6)?,
                fine,
                state: LoanState::from_fine(fine),
            })
        })?;

        let mut loans = Vec::new();
        for row in rows {
            loans.push(row?);
        }
        Ok(loans)
    }
}
