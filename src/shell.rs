use crate::catalog::Catalog;
use crate::error::{LibraryError, Result};
use crate::loans::Loans;
use crate::models::{Book, BookForm, CheckoutForm, Loan, Member, MemberForm, Publisher, PublisherForm, ReturnForm};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tabled::{Table, Tabled};

const HELP: &str = "\
Commands:
  books [--json]            list books
  add-book                  add a book
  delete-book <id>          delete a book
  members [--json]          list members
  add-member                add a member
  delete-member <id>        delete a member
  publishers [--json]       list publishers
  add-publisher             add a publisher
  delete-publisher <id>     delete a publisher
  borrow                    lend a book to a member
  return                    take a book back and charge any fine
  loans [--json]            list borrowed books
  help                      show this text
  quit | exit               leave";

#[derive(Tabled)]
struct BookRow {
  #[tabled(rename = "ID")]
  id: i64,
  #[tabled(rename = "Title")]
  title: String,
  #[tabled(rename = "Author")]
  author: String,
  #[tabled(rename = "ISBN")]
  isbn: String,
  #[tabled(rename = "Copies")]
  copies: String,
}

#[derive(Tabled)]
struct MemberRow {
  #[tabled(rename = "ID")]
  id: i64,
  #[tabled(rename = "Name")]
  name: String,
  #[tabled(rename = "Email")]
  email: String,
  #[tabled(rename = "Phone")]
  phone: String,
}

#[derive(Tabled)]
struct PublisherRow {
  #[tabled(rename = "ID")]
  id: i64,
  #[tabled(rename = "Name")]
  name: String,
  #[tabled(rename = "Address")]
  address: String,
  #[tabled(rename = "Contact")]
  contact: String,
}

#[derive(Tabled)]
struct LoanRow {
  #[tabled(rename = "Transaction ID")]
  id: i64,
  #[tabled(rename = "Member Name")]
  member: String,
  #[tabled(rename = "Book Title")]
  book: String,
  #[tabled(rename = "Borrow Date")]
  borrowed: String,
  #[tabled(rename = "Return Date")]
  returned: String,
  #[tabled(rename = "Fine")]
  fine: String,
  #[tabled(rename = "Status")]
  state: String,
}

impl From<&Book> for BookRow {
  fn from(book: &Book) -> Self {
    BookRow {
      id: book.id,
      title: book.title.clone().unwrap_or_default(),
      author: book.author.clone().unwrap_or_default(),
      isbn: book.isbn.clone().unwrap_or_default(),
      copies: book
        .copies_available
        .map(|value| value.to_string())
        .unwrap_or_default(),
    }
  }
}

impl From<&Member> for MemberRow {
  fn from(member: &Member) -> Self {
    MemberRow {
      id: member.id,
      name: member.name.clone().unwrap_or_default(),
      email: member.email.clone().unwrap_or_default(),
      phone: member.phone.clone().unwrap_or_default(),
    }
  }
}

impl From<&Publisher> for PublisherRow {
  fn from(publisher: &Publisher) -> Self {
    PublisherRow {
      id: publisher.id,
      name: publisher.name.clone(),
      address: publisher.address.clone().unwrap_or_default(),
      contact: publisher.contact_number.clone().unwrap_or_default(),
    }
  }
}

impl From<&Loan> for LoanRow {
  fn from(loan: &Loan) -> Self {
    let unknown = |id: Option<i64>| match id {
      Some(id) => format!("#{} (missing)", id),
      None => String::new(),
    };
    LoanRow {
      id: loan.id,
      member: loan
        .member_name
        .clone()
        .unwrap_or_else(|| unknown(loan.member_id)),
      book: loan
        .book_title
        .clone()
        .unwrap_or_else(|| unknown(loan.book_id)),
      borrowed: loan.borrow_date.clone().unwrap_or_default(),
      returned: loan.return_date.clone().unwrap_or_default(),
      fine: loan
        .fine
        .map(|fine| format!("{:.2}", fine))
        .unwrap_or_default(),
      state: loan.state.to_string(),
    }
  }
}

/// Line-oriented front end: reads commands and form fields from `input`,
/// writes messages and tables to `output`.
pub struct Shell<R, W> {
  catalog: Catalog,
  loans: Loans,
  input: R,
  output: W,
}

impl<R: BufRead, W: Write> Shell<R, W> {
  pub fn new(db_path: &Path, input: R, output: W) -> Self {
    Shell {
      catalog: Catalog::new(db_path),
      loans: Loans::new(db_path),
      input,
      output,
    }
  }

  /// Run until `quit` or end of input.
  pub fn run(&mut self) -> io::Result<()> {
    writeln!(self.output, "Library Management System. Type 'help' for commands.")?;
    loop {
      write!(self.output, "library> ")?;
      self.output.flush()?;
      let Some(line) = self.read_line()? else {
        writeln!(self.output)?;
        return Ok(());
      };
      if !self.dispatch(line.trim())? {
        return Ok(());
      }
    }
  }

  /// Execute one command line. Returns false when the user asked to leave.
  pub fn dispatch(&mut self, line: &str) -> io::Result<bool> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
      return Ok(true);
    };
    let args: Vec<&str> = words.collect();
    let json = args.contains(&"--json");
    let selection = args.iter().copied().find(|arg| !arg.starts_with("--"));

    let result = match command {
      "quit" | "exit" => return Ok(false),
      "help" => Ok(HELP.to_string()),
      "books" => self.show_books(json),
      "add-book" => self.add_book(),
      "delete-book" => self.delete_book(selection),
      "members" => self.show_members(json),
      "add-member" => self.add_member(),
      "delete-member" => self.delete_member(selection),
      "publishers" => self.show_publishers(json),
      "add-publisher" => self.add_publisher(),
      "delete-publisher" => self.delete_publisher(selection),
      "borrow" => self.borrow(),
      "return" => self.give_back(),
      "loans" => self.show_loans(json),
      other => Err(LibraryError::Validation(format!(
        "Unknown command '{}'. Type 'help' for commands.",
        other
      ))),
    };

    match result {
      Ok(message) => writeln!(self.output, "{}", message)?,
      Err(LibraryError::Io(err)) => return Err(err),
      Err(err) => {
        log::warn!("{} failed: {}", command, err);
        writeln!(self.output, "Error: {}", err)?;
      }
    }
    Ok(true)
  }

  fn show_books(&mut self, json: bool) -> Result<String> {
    let books = self.catalog.list_books()?;
    if json {
      return Ok(serde_json::to_string_pretty(&books).map_err(io::Error::from)?);
    }
    Ok(Table::new(books.iter().map(BookRow::from)).to_string())
  }

  fn add_book(&mut self) -> Result<String> {
    let form = BookForm {
      title: self.ask("Title")?,
      author: self.ask("Author")?,
      isbn: self.ask("ISBN")?,
      publisher: self.ask("Publisher")?,
      year: self.ask("Year Published")?,
      category: self.ask("Category")?,
      copies: self.ask("Copies Available")?,
    };
    let id = self.catalog.add_book(form)?;
    Ok(format!("Book added successfully! (ID {})", id))
  }

  fn delete_book(&mut self, selection: Option<&str>) -> Result<String> {
    let id = selected(selection, "book")?;
    if !self.confirm(&format!("Are you sure you want to delete the book with ID {}?", id))? {
      return Ok("Nothing deleted.".to_string());
    }
    self.catalog.delete_book(id)?;
    Ok(format!("Book deleted successfully!\n{}", self.show_books(false)?))
  }

  fn show_members(&mut self, json: bool) -> Result<String> {
    let members = self.catalog.list_members()?;
    if json {
      return Ok(serde_json::to_string_pretty(&members).map_err(io::Error::from)?);
    }
    Ok(Table::new(members.iter().map(MemberRow::from)).to_string())
  }

  fn add_member(&mut self) -> Result<String> {
    let form = MemberForm {
      name: self.ask("Name")?,
      email: self.ask("Email")?,
      phone: self.ask("Phone")?,
      address: self.ask("Address")?,
    };
    let id = self.catalog.add_member(form)?;
    Ok(format!("Member added successfully! (ID {})", id))
  }

  fn delete_member(&mut self, selection: Option<&str>) -> Result<String> {
    let id = selected(selection, "member")?;
    if !self.confirm(&format!("Are you sure you want to delete the member with ID {}?", id))? {
      return Ok("Nothing deleted.".to_string());
    }
    self.catalog.delete_member(id)?;
    Ok(format!("Member deleted successfully!\n{}", self.show_members(false)?))
  }

  fn show_publishers(&mut self, json: bool) -> Result<String> {
    let publishers = self.catalog.list_publishers()?;
    if json {
      return Ok(serde_json::to_string_pretty(&publishers).map_err(io::Error::from)?);
    }
    Ok(Table::new(publishers.iter().map(PublisherRow::from)).to_string())
  }

  fn add_publisher(&mut self) -> Result<String> {
    let form = PublisherForm {
      name: self.ask("Publisher Name")?,
      address: self.ask("Address")?,
      contact_number: self.ask("Contact Number")?,
    };
    let id = self.catalog.add_publisher(form)?;
    Ok(format!("Publisher added successfully! (ID {})", id))
  }

  fn delete_publisher(&mut self, selection: Option<&str>) -> Result<String> {
    let id = selected(selection, "publisher")?;
    if !self.confirm(&format!("Are you sure you want to delete the publisher with ID {}?", id))? {
      return Ok("Nothing deleted.".to_string());
    }
    self.catalog.delete_publisher(id)?;
    Ok(format!("Publisher deleted successfully!\n{}", self.show_publishers(false)?))
  }

  fn borrow(&mut self) -> Result<String> {
    let form = CheckoutForm {
      member_id: self.ask("Member ID")?,
      book_id: self.ask("Book ID")?,
      borrow_date: self.ask("Borrow Date (YYYY-MM-DD)")?,
      due_date: self.ask("Return Date (YYYY-MM-DD)")?,
    };
    let id = self.loans.checkout(form)?;
    Ok(format!("Book borrowed successfully! (transaction {})", id))
  }

  fn give_back(&mut self) -> Result<String> {
    let form = ReturnForm {
      member_id: self.ask("Member ID")?,
      book_id: self.ask("Book ID")?,
      return_date: self.ask("Return Date (YYYY-MM-DD)")?,
    };
    let receipt = self.loans.return_book(form)?;
    Ok(format!("Book returned successfully! Fine: ${:.2}", receipt.fine))
  }

  fn show_loans(&mut self, json: bool) -> Result<String> {
    let loans = self.loans.list_loans()?;
    if json {
      return Ok(serde_json::to_string_pretty(&loans).map_err(io::Error::from)?);
    }
    Ok(Table::new(loans.iter().map(LoanRow::from)).to_string())
  }

  fn ask(&mut self, label: &str) -> io::Result<String> {
    write!(self.output, "{}: ", label)?;
    self.output.flush()?;
    Ok(self.read_line()?.unwrap_or_default())
  }

  fn confirm(&mut self, question: &str) -> io::Result<bool> {
    let answer = self.ask(&format!("{} [y/N]", question))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
  }

  fn read_line(&mut self) -> io::Result<Option<String>> {
    let mut line = String::new();
    if self.input.read_line(&mut line)? == 0 {
      return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
  }
}

/// The record the user picked from a listing, if any.
fn selected(selection: Option<&str>, kind: &str) -> Result<i64> {
  let raw = selection
    .ok_or_else(|| LibraryError::NotFound(format!("Please select a {} to delete.", kind)))?;
  raw.parse::<i64>().map_err(|_| {
    LibraryError::NotFound(format!("Please select a {} to delete (got '{}').", kind, raw))
  })
}

#[cfg(test)]
mod tests {
  use super::Shell;
  use crate::db;
  use std::io::Cursor;
  use tempfile::TempDir;

  fn session(script: &str) -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");
    db::init_db(&path).unwrap();
    let mut output = Vec::new();
    Shell::new(&path, Cursor::new(script.to_string()), &mut output)
      .run()
      .unwrap();
    (dir, String::from_utf8(output).unwrap())
  }

  #[test]
  fn borrow_and_late_return_report_fine() {
    let script = "\
add-member
Ada Lovelace
ada@example.com
555-0100

add-book
Dune
Frank Herbert
9780441172719
Chilton
1965
Science Fiction
3
borrow
1
1
2024-01-01
2024-01-15
return
1
1
2024-01-20
loans
quit
";
    let (_dir, output) = session(script);
    assert!(output.contains("Member added successfully! (ID 1)"));
    assert!(output.contains("Book added successfully! (ID 1)"));
    assert!(output.contains("Book borrowed successfully!"));
    assert!(output.contains("Book returned successfully! Fine: $2.50"));
    assert!(output.contains("Ada Lovelace"));
    assert!(output.contains("closed"));
  }

  #[test]
  fn errors_are_reported_and_session_continues() {
    let script = "\
return
1
1
15-01-2024
delete-book
frobnicate
books
";
    let (_dir, output) = session(script);
    assert!(output.contains("Error: Invalid return date '15-01-2024'. Use YYYY-MM-DD."));
    assert!(output.contains("Error: Please select a book to delete."));
    assert!(output.contains("Error: Unknown command 'frobnicate'"));
    assert!(output.contains("Title"));
  }

  #[test]
  fn exit_is_listed_and_ends_session() {
    let (_dir, output) = session("help\nexit\nbooks\n");
    assert!(output.contains("quit | exit"));
    assert!(!output.contains("Copies"));
  }

  #[test]
  fn delete_asks_for_confirmation() {
    let script = "\
add-member
Grace Hopper
grace@example.com
555-0101

delete-member 1
n
members --json
delete-member 1
y
";
    let (_dir, output) = session(script);
    assert!(output.contains("Are you sure you want to delete the member with ID 1? [y/N]"));
    assert!(output.contains("Nothing deleted."));
    assert!(output.contains("\"email\": \"grace@example.com\""));
    assert!(output.contains("Member deleted successfully!"));
  }

  #[test]
  fn duplicate_isbn_is_reported() {
    let script = "\
add-book
Dune
Frank Herbert
1

1965

1
add-book
Dune Messiah
Frank Herbert
1


SF
1
";
    let (_dir, output) = session(script);
    assert!(output.contains("Error: A book with ISBN 1 already exists (ID 1)."));
  }
}
