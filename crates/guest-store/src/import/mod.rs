//! Contact import from CSV and vCard files.
//!
//! Parsing is separate from storing: a parser yields the usable contacts
//! plus a count of skipped records, and `ContactsRepo::import` writes them.

mod csv;
mod vcard;

pub use self::csv::parse_csv;
pub use self::vcard::parse_vcard;

use crate::models::{ContactSource, NewContact};
use crate::{ImportError, ImportResult};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Vcard,
}

impl ImportFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("vcf") | Some("vcard") => Ok(Self::Vcard),
            _ => Err(ImportError::UnsupportedFormat(format!(
                "{} (expected .csv or .vcf)",
                path.display()
            ))),
        }
    }

    pub fn source(&self) -> ContactSource {
        match self {
            Self::Csv => ContactSource::CsvImport,
            Self::Vcard => ContactSource::VcardImport,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::Vcard => "VCF",
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedImport {
    pub format: ImportFormat,
    /// Normalized: trimmed, blank optional fields as `None`.
    pub contacts: Vec<NewContact>,
    /// Records dropped for lacking a name.
    pub skipped: usize,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportReport {
    Imported {
        format: ImportFormat,
        count: usize,
        skipped: usize,
    },
    /// The file parsed but held no usable contacts.
    Empty { format: ImportFormat },
}

impl ImportReport {
    pub fn count(&self) -> usize {
        match self {
            Self::Imported { count, .. } => *count,
            Self::Empty { .. } => 0,
        }
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imported {
                format: ImportFormat::Csv,
                count,
                ..
            } => write!(f, "{} contact(s) imported successfully!", count),
            Self::Imported { count, .. } => {
                write!(f, "{} contact(s) imported successfully from VCF!", count)
            }
            Self::Empty {
                format: ImportFormat::Csv,
            } => f.write_str("No valid contacts found in the CSV to import."),
            Self::Empty { .. } => {
                f.write_str("No valid contacts with names found in the VCF to import.")
            }
        }
    }
}

/// Parse `content` in the given format.
pub fn parse(format: ImportFormat, content: &str) -> ImportResult<ParsedImport> {
    match format {
        ImportFormat::Csv => parse_csv(content.as_bytes()),
        ImportFormat::Vcard => parse_vcard(content),
    }
}

/// Read and parse a file, choosing the format by extension.
pub fn parse_file(path: &Path) -> ImportResult<ParsedImport> {
    let format = ImportFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    parse(format, &content)
}

/// Keep `candidate` if it has a name, counting it as skipped otherwise.
fn collect(candidate: NewContact, contacts: &mut Vec<NewContact>, skipped: &mut usize) {
    match candidate.normalized() {
        Some(contact) => contacts.push(contact),
        None => *skipped += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ImportFormat::from_path(Path::new("guests.CSV")).unwrap(),
            ImportFormat::Csv
        );
        assert_eq!(
            ImportFormat::from_path(Path::new("phone.vcf")).unwrap(),
            ImportFormat::Vcard
        );
        assert!(matches!(
            ImportFormat::from_path(Path::new("notes.txt")),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_report_messages() {
        assert_eq!(
            ImportReport::Empty {
                format: ImportFormat::Csv
            }
            .to_string(),
            "No valid contacts found in the CSV to import."
        );
        let report = ImportReport::Imported {
            format: ImportFormat::Vcard,
            count: 3,
            skipped: 1,
        };
        assert_eq!(report.count(), 3);
        assert_eq!(
            report.to_string(),
            "3 contact(s) imported successfully from VCF!"
        );
    }

    #[test]
    fn test_parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guests.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Name,Email").unwrap();
        writeln!(file, "Alice,a@x.com").unwrap();

        let parsed = parse_file(&path).unwrap();
        assert_eq!(parsed.format, ImportFormat::Csv);
        assert_eq!(parsed.contacts.len(), 1);
    }
}
