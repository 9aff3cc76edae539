use tracing::debug;

use crate::{
    error::ApiError,
    gateway::Gateway,
    models::LookupItem,
    schema::lookup_range,
};

/// Loads the name → identifier table from columns A/B of `tab`, starting at
/// row 2. Rows where either trimmed cell is empty are dropped; order is kept.
pub async fn load_lookup_items(
    gateway: &dyn Gateway,
    token: &str,
    spreadsheet_id: &str,
    tab: &str,
) -> Result<Vec<LookupItem>, ApiError> {
    let rows = gateway
        .read_rows(token, spreadsheet_id, &lookup_range(tab))
        .await?;
    let total = rows.len();
    let items = rows_to_items(rows);

    debug!(
        "[lookup] {} of {} rows usable in {}/{}",
        items.len(),
        total,
        spreadsheet_id,
        tab
    );
    Ok(items)
}

pub fn rows_to_items(rows: Vec<Vec<String>>) -> Vec<LookupItem> {
    rows.into_iter()
        .filter_map(|row| {
            let mut cells = row.into_iter();
            let name = cells.next().unwrap_or_default().trim().to_string();
            let identifier = cells.next().unwrap_or_default().trim().to_string();
            if name.is_empty() || identifier.is_empty() {
                None
            } else {
                Some(LookupItem { name, identifier })
            }
        })
        .collect()
}

/// Identifier of the first item whose name equals `name` (trimmed).
pub fn resolve_identifier(items: &[LookupItem], name: &str) -> Option<String> {
    let name = name.trim();
    items
        .iter()
        .find(|item| item.name == name)
        .map(|item| item.identifier.clone())
}
