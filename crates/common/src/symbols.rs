//! Symbol list parsing: the symbols file used by the CLI and the
//! comma-separated override accepted by the HTTP adapter.

use std::path::Path;
use tracing::warn;

use crate::error::{PremiumError, Result};
use crate::types::SymbolEntry;

/// Parse a symbols file body.
///
/// Accepts `SYM,shares`, `SYM shares` or a bare `SYM` per line. Blank lines
/// and `#` comments are skipped. A share count that does not parse becomes 0.
pub fn parse_symbol_lines(text: &str) -> Vec<SymbolEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> SymbolEntry {
    let (symbol, shares) = match line.split_once(',') {
        Some((symbol, shares)) => (symbol.trim(), Some(shares.trim())),
        None => {
            let mut parts = line.split_whitespace();
            let symbol = parts.next().unwrap_or(line);
            (symbol, parts.next())
        }
    };

    let shares = match shares.filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
            warn!("Unparseable share count '{}' for {}, using 0", raw, symbol);
            0
        }),
        None => 0,
    };

    SymbolEntry::new(symbol, shares)
}

/// Load and parse a symbols file; a missing file or an empty list is an input error.
pub fn load_symbols_file(path: &Path) -> Result<Vec<SymbolEntry>> {
    if !path.is_file() {
        return Err(PremiumError::Input(format!(
            "symbols file not found: {}",
            path.display()
        )));
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| PremiumError::Input(format!("cannot read {}: {e}", path.display())))?;
    let entries = parse_symbol_lines(&text);
    if entries.is_empty() {
        return Err(PremiumError::Input(format!(
            "no symbols found in {}",
            path.display()
        )));
    }
    Ok(entries)
}

/// Parse a `?symbols=` override: comma separated, trimmed, upper-cased.
///
/// Returns `None` when the override is absent or contains no symbols.
pub fn parse_symbol_override(raw: Option<&str>) -> Option<Vec<SymbolEntry>> {
    let raw = raw?.trim();
    let entries: Vec<SymbolEntry> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| SymbolEntry::without_shares(s.to_uppercase()))
        .collect();

    if entries.is_empty() {
        None
    } else {
        Some(entries)
    }
}
