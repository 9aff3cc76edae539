//! Destination-tab layout and the small string helpers around it.
//!
//! The two historical row layouts (without and with affiliate support) are
//! one [`SheetSchema`] value, so the pipeline never branches on copy-pasted
//! code paths, only on the descriptor.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

const BASE_HEADER: [&str; 3] = ["videoURL", "content", "affiliate_id"];
const AFFILIATE_HEADER: [&str; 4] = ["videoURL", "content", "affiliate_id", "name"];

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SheetSchema {
    /// `videoURL, content, affiliate_id`; rows fill the identifier only
    /// when one was chosen.
    Base,
    /// `videoURL, content, affiliate_id, name`; rows also carry the
    /// resolved identifier and are inserted as new physical rows.
    #[default]
    Affiliate,
}

impl SheetSchema {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            SheetSchema::Base => &BASE_HEADER,
            SheetSchema::Affiliate => &AFFILIATE_HEADER,
        }
    }

    pub fn width(self) -> usize {
        self.header().len()
    }

    /// Letter of the last column covered by the schema (`C` or `D`).
    pub fn last_column(self) -> char {
        (b'A' + (self.width() as u8 - 1)) as char
    }

    /// Append with `insertDataOption=INSERT_ROWS` instead of overwriting
    /// the first blank row the service finds.
    pub fn inserts_rows(self) -> bool {
        matches!(self, SheetSchema::Affiliate)
    }

    pub fn header_range(self, tab: &str) -> String {
        format!("{}!A1:{}1", quote_tab(tab), self.last_column())
    }

    pub fn append_range(self, tab: &str) -> String {
        format!("{}!A:{}", quote_tab(tab), self.last_column())
    }

    /// Values written for one uploaded file. The base layout leaves the
    /// identifier out when none was chosen; an affiliate row always carries
    /// the cell, empty when nothing was selected.
    pub fn row(self, link: &str, content: &str, identifier: Option<&str>) -> Vec<String> {
        let mut row = vec![link.to_string(), content.to_string()];
        match (self, identifier) {
            (SheetSchema::Affiliate, id) => row.push(id.unwrap_or_default().to_string()),
            (SheetSchema::Base, Some(id)) => row.push(id.to_string()),
            (SheetSchema::Base, None) => {}
        }
        row
    }
}

impl FromStr for SheetSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(SheetSchema::Base),
            "affiliate" => Ok(SheetSchema::Affiliate),
            other => Err(format!("unknown sheet schema {:?}", other)),
        }
    }
}

/// Quotes a tab title for A1 notation, doubling embedded quotes.
pub fn quote_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

/// Range of the lookup table: columns A and B from row 2 down.
pub fn lookup_range(tab: &str) -> String {
    format!("{}!A2:B", quote_tab(tab))
}

/// Escapes a literal for the Drive `q` query language.
pub fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Canonical browser link for a Drive file id.
pub fn drive_view_link(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view", file_id)
}

pub fn spreadsheet_link(spreadsheet_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{}/edit", spreadsheet_id)
}

/// Accepts either a bare spreadsheet id or any URL containing
/// `/spreadsheets/d/<id>`.
pub fn extract_spreadsheet_id(input: &str) -> String {
    let input = input.trim();
    if let Some(idx) = input.find("/spreadsheets/d/") {
        let rest = &input[idx + "/spreadsheets/d/".len()..];
        let id: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if !id.is_empty() {
            return id;
        }
    }
    input.to_string()
}
