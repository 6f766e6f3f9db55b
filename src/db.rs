use crate::error::Result;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// File name the library has always used, relative to the working directory.
pub const DEFAULT_DB_FILE: &str = "library.db";

/// Create the four library tables if they are missing.
///
/// Safe to call against a file that is already initialized; existing rows
/// and existing table definitions are left alone.
pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Publisher (
            PublisherID INTEGER PRIMARY KEY,
            PublisherName TEXT NOT NULL,
            Address TEXT,
            ContactNumber TEXT
        )",
        [],
    )?;

    // PublisherID stays nullable: a book without a publisher has nothing to point at.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS Book (
            Book_ID INTEGER PRIMARY KEY,
            Title TEXT,
            Author TEXT,
            ISBN TEXT UNIQUE,
            Publisher TEXT,
            Year_Published INTEGER,
            PublisherID INTEGER,
            Category TEXT,
            Copies_Available INTEGER,
            FOREIGN KEY (PublisherID) REFERENCES Publisher(PublisherID)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Member (
            Member_ID INTEGER PRIMARY KEY,
            Name TEXT,
            Email TEXT UNIQUE,
            Phone TEXT,
            Address TEXT,
            Registration_Date TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Borrow (
            Transaction_ID INTEGER PRIMARY KEY,
            Member_ID INTEGER,
            Book_ID INTEGER,
            Borrow_Date TEXT,
            Return_Date TEXT,
            Fine REAL,
            FOREIGN KEY (Member_ID) REFERENCES Member(Member_ID),
            FOREIGN KEY (Book_ID) REFERENCES Book(Book_ID)
        )",
        [],
    )?;

    log::info!("library store ready at {}", db_path.display());
    Ok(())
}

/// Open a connection for a single operation.
///
/// Foreign keys are declared in the schema but not enforced, so deletes never
/// cascade and loans may point at records that no longer exist.
pub fn open_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    Ok(conn)
}
