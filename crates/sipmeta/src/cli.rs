//! CLI output formatting and errors
//!
//! Table and detail views for token records, plus JSON output for scripting.

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use sipmeta_core::store::StoreStats;
use sipmeta_core::{ContractId, TokenCacheData};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    NotFound { contract_id: ContractId },
    Blacklisted { contract_id: ContractId },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::NotFound { contract_id } => {
                write!(f, "No metadata found for {} (no source named the token)", contract_id)
            }
            CliError::Blacklisted { contract_id } => {
                write!(
                    f,
                    "{} is blacklisted (run 'sipmeta blacklist remove {}' first)",
                    contract_id, contract_id
                )
            }
        }
    }
}

impl std::error::Error for CliError {}

// ============================================================================
// Formatters
// ============================================================================

/// Format managed tokens as table (human) or JSON
///
/// Rows without a cached record show `-` and are listed as `null` in JSON.
pub fn format_token_table(rows: &[(ContractId, Option<TokenCacheData>)], json: bool, no_color: bool) -> String {
    if json {
        let values: Vec<serde_json::Value> = rows
            .iter()
            .map(|(id, data)| {
                serde_json::json!({
                    "contractId": id.as_str(),
                    "cached": data,
                })
            })
            .collect();
        return serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string());
    }

    if rows.is_empty() {
        return "No managed tokens.".to_string();
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let headers = ["Contract", "Symbol", "Name", "Decimals", "Supply", "Updated"];
    if no_color {
        table.set_header(headers.to_vec());
    } else {
        table.set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)).collect::<Vec<_>>());
    }

    let now = Utc::now();
    for (id, data) in rows {
        let contract = shorten_contract(id);
        let row = match data {
            Some(data) => vec![
                contract,
                truncate(&data.symbol, 12),
                truncate(&data.name, 30),
                data.decimals.to_string(),
                data.display_supply().map(|s| format_supply(&s)).unwrap_or_else(|| "-".to_string()),
                format_age(data.last_updated, now),
            ],
            None => vec![
                contract,
                "-".to_string(),
                "(not cached)".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ],
        };
        table.add_row(Row::from(row));
    }

    table.to_string()
}

/// Format a single token record (human or JSON)
pub fn format_token_info(data: &TokenCacheData, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    }

    let mut lines = vec![];
    lines.push(format!("Contract:      {}", data.contract_id));
    lines.push(format!("Name:          {}", data.name));
    lines.push(format!("Symbol:        {}", data.symbol));
    lines.push(format!("Decimals:      {}", data.decimals));
    lines.push(format!(
        "Identifier:    {}",
        data.identifier.as_deref().unwrap_or("-")
    ));
    lines.push(format!(
        "Total supply:  {}",
        data.display_supply().unwrap_or_else(|| "-".to_string())
    ));
    lines.push(format!(
        "Description:   {}",
        data.description.as_deref().map(|d| truncate(d, 100)).unwrap_or_else(|| "-".to_string())
    ));
    lines.push(format!("Image:         {}", data.image.as_deref().unwrap_or("-")));
    lines.push(format!("Token URI:     {}", data.token_uri.as_deref().unwrap_or("-")));
    lines.push(format!("Type:          {}", data.token_type));
    lines.push(format!("Last updated:  {}", data.last_updated.to_rfc3339()));

    lines.join("\n")
}

/// One contract ID per line, or a JSON array
pub fn format_id_list(ids: &[ContractId], json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(ids).unwrap_or_else(|_| "[]".to_string());
    }
    if ids.is_empty() {
        return "(empty)".to_string();
    }
    ids.iter().map(ContractId::as_str).collect::<Vec<_>>().join("\n")
}

pub fn format_store_stats(stats: &StoreStats) -> String {
    format!(
        "Entries: {} ({} expired), {}",
        stats.total_entries,
        stats.expired_entries,
        format_bytes(stats.total_size_bytes)
    )
}

// ============================================================================
// Utilities
// ============================================================================

fn truncate(s: &str, max: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max {
        s.to_string()
    } else {
        // Char-based so multi-byte names never split
        s.chars().take(max - 1).collect::<String>() + "…"
    }
}

/// `SP2ZNG…Z55KS.charisma-token`
fn shorten_contract(id: &ContractId) -> String {
    let address = id.address();
    if address.len() <= 12 {
        return id.to_string();
    }
    format!(
        "{}…{}.{}",
        &address[..6],
        &address[address.len() - 5..],
        id.contract_name()
    )
}

/// Abbreviate the whole part of a display supply: `1234567.5` → `1.2M`
fn format_supply(display: &str) -> String {
    let whole = display.split('.').next().unwrap_or(display);
    let Ok(value) = whole.parse::<u128>() else {
        return display.to_string();
    };
    let units = [(1_000_000_000_000u128, "T"), (1_000_000_000, "B"), (1_000_000, "M"), (1_000, "K")];
    for (scale, suffix) in units {
        if value >= scale {
            return format!("{:.1}{}", value as f64 / scale as f64, suffix);
        }
    }
    display.to_string()
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(at);
    if age.num_days() > 0 {
        format!("{}d ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn format_bytes(bytes: usize) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sipmeta_core::models::TokenSupply;

    const CHA: &str = "SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.charisma-token";

    fn charisma() -> TokenCacheData {
        TokenCacheData {
            contract_id: ContractId::parse(CHA).unwrap(),
            name: "Charisma".to_string(),
            symbol: "CHA".to_string(),
            decimals: 6,
            identifier: Some("charisma".to_string()),
            total_supply: Some(TokenSupply(1_500_000_000_000)),
            ..TokenCacheData::native_stx()
        }
    }

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate("hello world", 20), "hello world");
        assert_eq!(truncate("hello world", 5), "hell…");
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate("café", 10), "café");
        assert_eq!(truncate("café", 3), "ca…");
        assert_eq!(truncate("日本語テスト", 4), "日本語…");
    }

    #[test]
    fn test_shorten_contract() {
        let id = ContractId::parse(CHA).unwrap();
        assert_eq!(shorten_contract(&id), "SP2ZNG…Z55KS.charisma-token");
        assert_eq!(shorten_contract(&ContractId::native()), ".stx");
    }

    #[test]
    fn test_format_supply() {
        assert_eq!(format_supply("1500000"), "1.5M");
        assert_eq!(format_supply("999.25"), "999.25");
        assert_eq!(format_supply("2500.5"), "2.5K");
    }

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - chrono::Duration::hours(5), now), "5h ago");
        assert_eq!(format_age(now - chrono::Duration::days(3), now), "3d ago");
    }

    #[test]
    fn test_format_token_info_human() {
        let output = format_token_info(&charisma(), false);
        assert!(output.contains("Symbol:        CHA"));
        assert!(output.contains("Total supply:  1500000"));
        assert!(output.contains("Identifier:    charisma"));
    }

    #[test]
    fn test_format_token_info_json() {
        let output = format_token_info(&charisma(), true);
        assert!(output.starts_with('{'));
        assert!(output.contains("\"contractId\": \"SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.charisma-token\""));
        assert!(output.contains("\"total_supply\": \"1500000000000\""));
    }

    #[test]
    fn test_format_token_table() {
        let id = ContractId::parse(CHA).unwrap();
        assert_eq!(format_token_table(&[], false, true), "No managed tokens.");

        let rows = vec![(id.clone(), Some(charisma())), (ContractId::native(), None)];
        let output = format_token_table(&rows, false, true);
        assert!(output.contains("CHA"));
        assert!(output.contains("1.5M"));
        assert!(output.contains("(not cached)"));

        let json = format_token_table(&rows, true, true);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["contractId"], CHA);
        assert!(parsed[1]["cached"].is_null());
    }

    #[test]
    fn test_format_id_list() {
        assert_eq!(format_id_list(&[], false), "(empty)");
        let ids = vec![ContractId::parse(CHA).unwrap()];
        assert_eq!(format_id_list(&ids, false), CHA);
        assert!(format_id_list(&ids, true).starts_with('['));
    }

    #[test]
    fn test_cli_error_messages() {
        let err = CliError::Blacklisted {
            contract_id: ContractId::parse(CHA).unwrap(),
        };
        assert!(err.to_string().contains("blacklist remove"));
    }

    #[test]
    fn test_format_store_stats() {
        let stats = StoreStats {
            total_entries: 12,
            expired_entries: 2,
            total_size_bytes: 2048,
        };
        assert_eq!(format_store_stats(&stats), "Entries: 12 (2 expired), 2.0 KB");
    }
}
