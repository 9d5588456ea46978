use super::{collect, ImportFormat, ParsedImport};
use crate::models::NewContact;
use crate::{ImportError, ImportResult};
use std::io::Read;

const NAME_COLUMN: &str = "Name";
const EMAIL_COLUMN: &str = "Email";
const PHONE_COLUMN: &str = "Phone";

/// Parse a CSV with a `Name` header and optional `Email`/`Phone` columns.
///
/// Rows may be shorter than the header; missing cells count as blank. Rows
/// with a blank name are skipped.
pub fn parse_csv<R: Read>(reader: R) -> ImportResult<ParsedImport> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let name_idx = column(NAME_COLUMN).ok_or(ImportError::MissingColumn(NAME_COLUMN))?;
    let email_idx = column(EMAIL_COLUMN);
    let phone_idx = column(PHONE_COLUMN);

    let mut contacts = Vec::new();
    let mut skipped = 0;
    for record in reader.records() {
        let record = record?;
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::to_string);
        let candidate = NewContact {
            name: cell(Some(name_idx)).unwrap_or_default(),
            email: cell(email_idx),
            phone: cell(phone_idx),
        };
        collect(candidate, &mut contacts, &mut skipped);
    }

    Ok(ParsedImport {
        format: ImportFormat::Csv,
        contacts,
        skipped,
    })
}
