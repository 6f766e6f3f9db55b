use crate::db;
use crate::error::{LibraryError, Result};
use crate::models::{
    lenient_int, optional_text, Book, BookForm, Member, MemberForm, NewBook, NewMember,
    NewPublisher, Publisher, PublisherForm,
};
use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

/// Create, list and delete the catalog records: books, members and publishers.
///
/// Every call opens its own connection and drops it before returning.
#[derive(Debug, Clone)]
pub struct Catalog {
    db_path: PathBuf,
}

impl Catalog {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Catalog {
            db_path: db_path.into(),
        }
    }

    /// Validate and store a new book, returning its `Book_ID`.
    pub fn add_book(&self, form: BookForm) -> Result<i64> {
        let book = NewBook::try_from(form)?;
        let mut conn = db::open_db(&self.db_path)?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT Book_ID FROM Book WHERE ISBN = ?1",
                params![book.isbn],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Err(duplicate_isbn(&book.isbn, Some(id)));
        }

        let publisher_id = match book.publisher.as_deref() {
            Some(name) => Some(resolve_publisher(&tx, name)?),
            None if publisher_id_required(&tx)? => {
                return Err(LibraryError::required("publisher"));
            }
            None => None,
        };

        tx.execute(
            "INSERT INTO Book (Title, Author, ISBN, Publisher, Year_Published, PublisherID, Category, Copies_Available) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                book.title,
                book.author,
                book.isbn,
                book.publisher,
                book.year_published,
                publisher_id,
                book.category,
                book.copies_available,
            ],
        )
        .map_err(|err| on_unique(err, || duplicate_isbn(&book.isbn, None)))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        log::info!("added book {} ({}) isbn={}", id, book.title, book.isbn);
        Ok(id)
    }

    pub fn list_books(&self) -> Result<Vec<Book>> {
        let conn = db::open_db(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT Book_ID, Title, Author, ISBN, Publisher, Year_Published, PublisherID, Category, Copies_Available \
             FROM Book",
        )?;
        let rows = stmt.query_map(params![], |row| {
            Ok(Book {
                id: row.get(0)?,
                title: optional_text(row, 1)?,
                author: optional_text(row, 2)?,
                isbn: optional_text(row, 3)?,
                publisher: optional_text(row, 4)?,
                year_published: lenient_int(row, 5)?,
                publisher_id: lenient_int(row, 6)?,
                category: optional_text(row, 7)?,
                copies_available: lenient_int(row, 8)?,
            })
        })?;

        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }

    /// Remove a book. Loans pointing at it are left as they are.
    pub fn delete_book(&self, id: i64) -> Result<()> {
        let conn = db::open_db(&self.db_path)?;
        let removed = conn.execute("DELETE FROM Book WHERE Book_ID = ?1", params![id])?;
        if removed == 0 {
            return Err(LibraryError::NotFound(format!("No book with ID {}.", id)));
        }
        log::info!("deleted book {}", id);
        Ok(())
    }

    /// Validate and store a new member registered today.
    pub fn add_member(&self, form: MemberForm) -> Result<i64> {
        self.add_member_on(form, Local::now().date_naive())
    }

    pub(crate) fn add_member_on(&self, form: MemberForm, registered: NaiveDate) -> Result<i64> {
        let member = NewMember::try_from(form)?;
        let conn = db::open_db(&self.db_path)?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT Member_ID FROM Member WHERE Email = ?1",
                params![member.email],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Err(duplicate_email(&member.email, Some(id)));
        }

        conn.execute(
            "INSERT INTO Member (Name, Email, Phone, Address, Registration_Date) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                member.name,
                member.email,
                member.phone,
                member.address,
                crate::models::format_date(registered),
            ],
        )
        .map_err(|err| on_unique(err, || duplicate_email(&member.email, None)))?;
        let id = conn.last_insert_rowid();

        log::info!("added member {} ({})", id, member.email);
        Ok(id)
    }

    pub fn list_members(&self) -> Result<Vec<Member>> {
        let conn = db::open_db(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT Member_ID, Name, Email, Phone, Address, Registration_Date FROM Member",
        )?;
        let rows = stmt.query_map(params![], |row| {
            Ok(Member {
                id: row.get(0)?,
                name: optional_text(row, 1)?,
                email: optional_text(row, 2)?,
                phone: optional_text(row, 3)?,
                address: optional_text(row, 4)?,
                registration_date: optional_text(row, 5)?,
            })
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Remove a member. Their loans stay behind with a dangling member ID.
    pub fn delete_member(&self, id: i64) -> Result<()> {
        let conn = db::open_db(&self.db_path)?;
        let removed = conn.execute("DELETE FROM Member WHERE Member_ID = ?1", params![id])?;
        if removed == 0 {
            return Err(LibraryError::NotFound(format!("No member with ID {}.", id)));
        }
        log::info!("deleted member {}", id);
        Ok(())
    }

    pub fn add_publisher(&self, form: PublisherForm) -> Result<i64> {
        let publisher = NewPublisher::try_from(form)?;
        let conn = db::open_db(&self.db_path)?;
        conn.execute(
            "INSERT INTO Publisher (PublisherName, Address, ContactNumber) VALUES (?1, ?2, ?3)",
            params![publisher.name, publisher.address, publisher.contact_number],
        )?;
        let id = conn.last_insert_rowid();
        log::info!("added publisher {} ({})", id, publisher.name);
        Ok(id)
    }

    pub fn list_publishers(&self) -> Result<Vec<Publisher>> {
        let conn = db::open_db(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT PublisherID, PublisherName, Address, ContactNumber FROM Publisher",
        )?;
        let rows = stmt.query_map(params![], |row| {
            Ok(Publisher {
                id: row.get(0)?,
                name: optional_text(row, 1)?.unwrap_or_default(),
                address: optional_text(row, 2)?,
                contact_number: optional_text(row, 3)?,
            })
        })?;

        let mut publishers = Vec::new();
        for row in rows {
            publishers.push(row?);
        }
        Ok(publishers)
    }

    /// Remove a publisher. Books keep their free-text publisher name.
    pub fn delete_publisher(&self, id: i64) -> Result<()> {
        let conn = db::open_db(&self.db_path)?;
        let removed = conn.execute("DELETE FROM Publisher WHERE PublisherID = ?1", params![id])?;
        if removed == 0 {
            return Err(LibraryError::NotFound(format!("No publisher with ID {}.", id)));
        }
        log::info!("deleted publisher {}", id);
        Ok(())
    }
}

/// Find a publisher by exact name, creating one when none exists yet.
fn resolve_publisher(conn: &Connection, name: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT PublisherID FROM Publisher WHERE PublisherName = ?1 ORDER BY PublisherID LIMIT 1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO Publisher (PublisherName) VALUES (?1)",
        params![name],
    )?;
    let id = conn.last_insert_rowid();
    log::info!("created publisher {} for '{}'", id, name);
    Ok(id)
}

/// Files written before PublisherID became optional declare it NOT NULL.
fn publisher_id_required(conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("PRAGMA table_info(Book)")?;
    let rows = stmt.query_map(params![], |row| {
        let name: String = row.get(1)?;
        let not_null: bool = row.get(3)?;
        Ok((name, not_null))
    })?;
    for row in rows {
        let (name, not_null) = row?;
        if name.eq_ignore_ascii_case("PublisherID") {
            return Ok(not_null);
        }
    }
    Ok(false)
}

fn on_unique(err: rusqlite::Error, duplicate: impl FnOnce() -> LibraryError) -> LibraryError {
    if LibraryError::is_unique_violation(&err) {
        duplicate()
    } else {
        err.into()
    }
}

fn duplicate_isbn(isbn: &str, existing: Option<i64>) -> LibraryError {
    match existing {
        Some(id) => LibraryError::Uniqueness(format!(
            "A book with ISBN {} already exists (ID {}).",
            isbn, id
        )),
        None => LibraryError::Uniqueness(format!("A book with ISBN {} already exists.", isbn)),
    }
}

fn duplicate_email(email: &str, existing: Option<i64>) -> LibraryError {
    match existing {
        Some(id) => LibraryError::Uniqueness(format!(
            "A member with email {} already exists (ID {}).",
            email, id
        )),
        None => LibraryError::Uniqueness(format!("A member with email {} already exists.", email)),
    }
}

#[cfg(test)]
mod tests {
    use super::Catalog;
    use crate::db;
    use crate::error::LibraryError;
    use crate::models::{BookForm, MemberForm, PublisherForm};
    use chrono::NaiveDate;
    use rusqlite::params;
    use tempfile::TempDir;

    fn catalog() -> (TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        db::init_db(&path).unwrap();
        (dir, Catalog::new(path))
    }

    fn book(isbn: &str) -> BookForm {
        BookForm {
            title: "The Left Hand of Darkness".to_string(),
            author: "Ursula K. Le Guin".to_string(),
            isbn: isbn.to_string(),
            publisher: "Ace Books".to_string(),
            year: "1969".to_string(),
            category: "Science Fiction".to_string(),
            copies: "2".to_string(),
        }
    }

    fn member(email: &str) -> MemberForm {
        MemberForm {
            name: "Grace Hopper".to_string(),
            email: email.to_string(),
            phone: "555-0101".to_string(),
            address: "".to_string(),
        }
    }

    #[test]
    fn added_book_shows_up_in_listing() {
        let (_dir, catalog) = catalog();
        let id = catalog.add_book(book("9780441478125")).unwrap();

        let books = catalog.list_books().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, id);
        assert_eq!(books[0].isbn.as_deref(), Some("9780441478125"));
        assert_eq!(books[0].year_published, Some(1969));
        assert_eq!(books[0].copies_available, Some(2));
    }

    #[test]
    fn duplicate_isbn_is_rejected_without_insert() {
        let (_dir, catalog) = catalog();
        catalog.add_book(book("9780441478125")).unwrap();

        let err = catalog.add_book(book("9780441478125")).unwrap_err();
        assert!(matches!(err, LibraryError::Uniqueness(_)));
        assert_eq!(catalog.list_books().unwrap().len(), 1);
    }

    #[test]
    fn missing_required_book_field_touches_nothing() {
        let (_dir, catalog) = catalog();
        let form = BookForm {
            author: "".to_string(),
            ..book("9780441478125")
        };
        assert!(matches!(
            catalog.add_book(form),
            Err(LibraryError::Validation(_))
        ));
        assert!(catalog.list_books().unwrap().is_empty());
        assert!(catalog.list_publishers().unwrap().is_empty());
    }

    #[test]
    fn books_share_a_publisher_by_name() {
        let (_dir, catalog) = catalog();
        catalog.add_book(book("1")).unwrap();
        catalog.add_book(book("2")).unwrap();
        catalog
            .add_book(BookForm {
                publisher: "".to_string(),
                ..book("3")
            })
            .unwrap();

        let publishers = catalog.list_publishers().unwrap();
        assert_eq!(publishers.len(), 1);
        assert_eq!(publishers[0].name, "Ace Books");

        let books = catalog.list_books().unwrap();
        assert_eq!(books[0].publisher_id, Some(publishers[0].id));
        assert_eq!(books[1].publisher_id, Some(publishers[0].id));
        assert_eq!(books[2].publisher_id, None);
        assert_eq!(books[2].publisher, None);
    }

    #[test]
    fn deleting_unknown_book_is_not_found() {
        let (_dir, catalog) = catalog();
        catalog.add_book(book("9780441478125")).unwrap();

        let err = catalog.delete_book(999).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
        assert_eq!(catalog.list_books().unwrap().len(), 1);
    }

    #[test]
    fn deleting_book_leaves_loans_in_place() {
        let (dir, catalog) = catalog();
        let id = catalog.add_book(book("9780441478125")).unwrap();
        let conn = db::open_db(&dir.path().join("library.db")).unwrap();
        conn.execute(
            "INSERT INTO Borrow (Member_ID, Book_ID, Borrow_Date, Return_Date) VALUES (1, ?1, '2024-01-01', '2024-01-15')",
            params![id],
        )
        .unwrap();

        catalog.delete_book(id).unwrap();

        assert!(catalog.list_books().unwrap().is_empty());
        let loans: i64 = conn
            .query_row("SELECT COUNT(*) FROM Borrow", [], |row| row.get(0))
            .unwrap();
        assert_eq!(loans, 1);
    }

    #[test]
    fn member_gets_registration_date() {
        let (_dir, catalog) = catalog();
        let registered = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let id = catalog
            .add_member_on(member("grace@example.com"), registered)
            .unwrap();

        let members = catalog.list_members().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, id);
        assert_eq!(members[0].registration_date.as_deref(), Some("2024-03-09"));
        assert_eq!(members[0].address, None);
    }

    #[test]
    fn duplicate_member_email_is_rejected() {
        let (_dir, catalog) = catalog();
        catalog.add_member(member("grace@example.com")).unwrap();

        let err = catalog.add_member(member("grace@example.com")).unwrap_err();
        assert!(matches!(err, LibraryError::Uniqueness(_)));
        assert_eq!(catalog.list_members().unwrap().len(), 1);
    }

    #[test]
    fn deleting_members() {
        let (_dir, catalog) = catalog();
        let id = catalog.add_member(member("grace@example.com")).unwrap();

        assert!(matches!(
            catalog.delete_member(id + 1),
            Err(LibraryError::NotFound(_))
        ));
        assert_eq!(catalog.list_members().unwrap().len(), 1);

        catalog.delete_member(id).unwrap();
        assert!(catalog.list_members().unwrap().is_empty());
    }

    #[test]
    fn publishers_round_trip() {
        let (_dir, catalog) = catalog();
        let id = catalog
            .add_publisher(PublisherForm {
                name: "Tor".to_string(),
                address: "New York".to_string(),
                contact_number: "".to_string(),
            })
            .unwrap();

        let publishers = catalog.list_publishers().unwrap();
        assert_eq!(publishers[0].id, id);
        assert_eq!(publishers[0].address.as_deref(), Some("New York"));
        assert_eq!(publishers[0].contact_number, None);

        assert!(matches!(
            catalog.add_publisher(PublisherForm::default()),
            Err(LibraryError::Validation(_))
        ));

        catalog.delete_publisher(id).unwrap();
        assert!(matches!(
            catalog.delete_publisher(id),
            Err(LibraryError::NotFound(_))
        ));
    }

    /// Book table as older library files declare it.
    fn legacy_catalog() -> (TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE Publisher (
                PublisherID INTEGER PRIMARY KEY,
                PublisherName TEXT NOT NULL,
                Address TEXT,
                ContactNumber TEXT);
             CREATE TABLE Book (
                Book_ID INTEGER PRIMARY KEY,
                Title TEXT,
                Author TEXT,
                ISBN TEXT UNIQUE,
                Publisher TEXT,
                Year_Published INTEGER,
                PublisherID INTEGER NOT NULL,
                Category TEXT,
                Copies_Available INTEGER,
                FOREIGN KEY (PublisherID) REFERENCES Publisher(PublisherID));",
        )
        .unwrap();
        drop(conn);
        db::init_db(&path).unwrap();
        (dir, Catalog::new(path))
    }

    #[test]
    fn legacy_file_links_named_publisher() {
        let (_dir, catalog) = legacy_catalog();
        let id = catalog.add_book(book("9780441478125")).unwrap();

        let books = catalog.list_books().unwrap();
        assert_eq!(books[0].id, id);
        assert_eq!(books[0].publisher_id, Some(catalog.list_publishers().unwrap()[0].id));
    }

    #[test]
    fn legacy_file_requires_publisher_name() {
        let (_dir, catalog) = legacy_catalog();
        let form = BookForm {
            publisher: "  ".to_string(),
            ..book("9780441478125")
        };

        let err = catalog.add_book(form).unwrap_err();
        assert!(matches!(err, LibraryError::Validation(_)));
        assert_eq!(err.to_string(), "Please fill out the publisher field.");
        assert!(catalog.list_books().unwrap().is_empty());
    }

    #[test]
    fn fresh_file_allows_blank_publisher() {
        let (_dir, catalog) = catalog();
        let form = BookForm {
            publisher: "".to_string(),
            ..book("9780441478125")
        };
        catalog.add_book(form).unwrap();
        assert_eq!(catalog.list_books().unwrap()[0].publisher_id, None);
    }

    #[test]
    fn legacy_blank_integers_read_as_none() {
        let (dir, catalog) = catalog();
        let conn = db::open_db(&dir.path().join("library.db")).unwrap();
        conn.execute(
            "INSERT INTO Book (Title, Author, ISBN, Publisher, Year_Published, Category, Copies_Available) \
             VALUES ('Old', 'Someone', 'X1', '', '', '', '4')",
            [],
        )
        .unwrap();

        let books = catalog.list_books().unwrap();
        assert_eq!(books[0].year_published, None);
        assert_eq!(books[0].publisher, None);
        assert_eq!(books[0].copies_available, Some(4));
    }
}
