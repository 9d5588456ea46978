use super::{collect, ImportFormat, ParsedImport};
use crate::models::NewContact;
use crate::{ImportError, ImportResult};

/// One unfolded content line: `[group.]NAME[;params]:value`.
struct Property<'a> {
    name: String,
    value: &'a str,
}

impl<'a> Property<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let colon = line.find(':')?;
        let (head, value) = (&line[..colon], &line[colon + 1..]);
        let name = head.split(';').next().unwrap_or(head);
        let name = name.rsplit('.').next().unwrap_or(name);
        Some(Self {
            name: name.trim().to_ascii_uppercase(),
            value,
        })
    }
}

#[derive(Default)]
struct Card {
    formatted_name: Option<String>,
    structured_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

impl Card {
    fn apply(&mut self, property: Property<'_>) {
        let slot = match property.name.as_str() {
            "FN" => &mut self.formatted_name,
            "N" => &mut self.structured_name,
            "EMAIL" => &mut self.email,
            "TEL" => &mut self.phone,
            _ => return,
        };
        // First occurrence wins.
        if slot.is_none() {
            *slot = Some(property.value.to_string());
        }
    }

    fn into_contact(self) -> NewContact {
        let formatted = self.formatted_name.map(|v| unescape(&v));
        let name = formatted
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.structured_name.as_deref().map(structured_name))
            .unwrap_or_default();
        NewContact {
            name,
            email: self.email.map(|v| unescape(&v)),
            phone: self.phone.map(|v| unescape(&v)),
        }
    }
}

/// `N:Family;Given;Additional;Prefix;Suffix` read as
/// "Prefix Given Additional Family Suffix".
fn structured_name(value: &str) -> String {
    let parts: Vec<String> = split_unescaped(value, ';')
        .into_iter()
        .map(|p| unescape(&p).trim().to_string())
        .collect();
    let part = |i: usize| parts.get(i).map(String::as_str).unwrap_or("");
    [part(3), part(1), part(2), part(0), part(4)]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_unescaped(value: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Join folded lines (continuations start with a space or tab), keeping the
/// physical line number each logical line started on.
fn unfold(input: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (index, raw) in input.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some((_, last)) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push((index + 1, raw.to_string()));
    }
    lines
}

/// Parse every `BEGIN:VCARD` .. `END:VCARD` block. The name comes from `FN`,
/// falling back to `N`; the first `EMAIL` and `TEL` are used. Cards without
/// a usable name are skipped.
pub fn parse_vcard(input: &str) -> ImportResult<ParsedImport> {
    let mut contacts = Vec::new();
    let mut skipped = 0;
    let mut current: Option<(usize, Card)> = None;
    let mut saw_card = false;

    for (line_no, line) in unfold(input) {
        if line.trim().is_empty() {
            continue;
        }
        let upper = line.trim().to_ascii_uppercase();
        if upper == "BEGIN:VCARD" {
            if let Some((start, _)) = current {
                return Err(ImportError::Vcard {
                    line: line_no,
                    message: format!("card starting at line {} has no END:VCARD", start),
                });
            }
            current = Some((line_no, Card::default()));
            saw_card = true;
            continue;
        }
        if upper == "END:VCARD" {
            let Some((_, card)) = current.take() else {
                return Err(ImportError::Vcard {
                    line: line_no,
                    message: "END:VCARD without BEGIN:VCARD".to_string(),
                });
            };
            collect(card.into_contact(), &mut contacts, &mut skipped);
            continue;
        }
        match current.as_mut() {
            Some((_, card)) => {
                if let Some(property) = Property::parse(&line) {
                    card.apply(property);
                }
            }
            None => {
                return Err(ImportError::Vcard {
                    line: line_no,
                    message: "content outside of BEGIN:VCARD/END:VCARD".to_string(),
                });
            }
        }
    }

    if let Some((start, _)) = current {
        return Err(ImportError::Vcard {
            line: start,
            message: "card has no END:VCARD".to_string(),
        });
    }
    if !saw_card && !input.trim().is_empty() {
        return Err(ImportError::Vcard {
            line: 1,
            message: "no BEGIN:VCARD found".to_string(),
        });
    }

    Ok(ParsedImport {
        format: ImportFormat::Vcard,
        contacts,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_email_tel() {
        let input = "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Alice Smith\r\nN:Smith;Alice;;;\r\nEMAIL;TYPE=work:alice@work.com\r\nEMAIL;TYPE=home:alice@home.com\r\nTEL;TYPE=cell:+1 555 0100\r\nEND:VCARD\r\n";

        let parsed = parse_vcard(input).unwrap();

        assert_eq!(
            parsed.contacts,
            vec![NewContact::new("Alice Smith")
                .with_email("alice@work.com")
                .with_phone("+1 555 0100")]
        );
    }

    #[test]
    fn test_structured_name_fallback() {
        let input = "BEGIN:VCARD\nVERSION:3.0\nN:Doe;Jane;Q;Dr.;\nEND:VCARD\n";
        let parsed = parse_vcard(input).unwrap();
        assert_eq!(parsed.contacts[0].name, "Dr. Jane Q Doe");
        assert_eq!(parsed.contacts[0].email, None);
    }

    #[test]
    fn test_nameless_cards_skipped() {
        let input = "BEGIN:VCARD\nEMAIL:ghost@x.com\nEND:VCARD\nBEGIN:VCARD\nFN:  \nN:;;;;\nEND:VCARD\nBEGIN:VCARD\nFN:Bob\nEND:VCARD\n";
        let parsed = parse_vcard(input).unwrap();
        assert_eq!(parsed.skipped, 2);
        assert_eq!(parsed.contacts, vec![NewContact::new("Bob")]);
    }

    #[test]
    fn test_folded_lines_groups_and_escapes() {
        let input = "BEGIN:VCARD\nitem1.FN:Smith\\, Anne-\n Marie\nitem1.EMAIL:anne@x.com\nEND:VCARD\n";
        let parsed = parse_vcard(input).unwrap();
        assert_eq!(parsed.contacts[0].name, "Smith, Anne-Marie");
        assert_eq!(parsed.contacts[0].email.as_deref(), Some("anne@x.com"));
    }

    #[test]
    fn test_empty_input_is_empty_report() {
        let parsed = parse_vcard("  \n").unwrap();
        assert!(parsed.contacts.is_empty());
    }

    #[test]
    fn test_unterminated_card_is_error() {
        let err = parse_vcard("BEGIN:VCARD\nFN:Alice\n").unwrap_err();
        assert!(matches!(err, ImportError::Vcard { line: 1, .. }));
    }

    #[test]
    fn test_not_a_vcard_is_error() {
        assert!(parse_vcard("Name,Email\nAlice,a@x.com\n").is_err());
    }
}
