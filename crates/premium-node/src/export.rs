use premium_common::{delta_key, PremiumError, Result, Row, RowRecord, TargetDeltas};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Column order of the long per-delta export.
pub const DETAIL_COLUMNS: [&str; 7] = [
    "symbol",
    "UnderlyingPrice",
    "Shares",
    "target_delta",
    "strike",
    "premium",
    "shares_times_premium",
];

fn csv_error(err: csv::Error) -> PremiumError {
    PremiumError::Export(err.to_string())
}

fn open(path: &Path) -> Result<File> {
    File::create(path)
        .map_err(|e| PremiumError::Export(format!("writing {}: {e}", path.display())))
}

/// One row per symbol with `{delta}S/P/N` column triples.
pub fn write_wide<W: Write>(out: W, rows: &[Row], deltas: &TargetDeltas) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(deltas.column_names()).map_err(csv_error)?;

    for row in rows {
        let mut record = Vec::with_capacity(row.field_count());
        record.push(row.symbol.clone());
        record.push(row.underlying_price.to_field());
        record.push(row.shares.map(|s| s.to_string()).unwrap_or_default());
        for cells in &row.deltas {
            record.push(cells.strike.to_field());
            record.push(cells.premium.to_field());
            record.push(cells.notional.to_field());
        }
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

/// One line per (symbol, target delta).
pub fn write_details<W: Write>(out: W, rows: &[Row]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(DETAIL_COLUMNS).map_err(csv_error)?;

    for row in rows {
        let price = row.underlying_price.to_field();
        let shares = row.shares.map(|s| s.to_string()).unwrap_or_default();
        for cells in &row.deltas {
            writer
                .write_record([
                    row.symbol.as_str(),
                    price.as_str(),
                    shares.as_str(),
                    delta_key(cells.delta).as_str(),
                    cells.strike.to_field().as_str(),
                    cells.premium.to_field().as_str(),
                    cells.notional.to_field().as_str(),
                ])
                .map_err(csv_error)?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Records in the shape the dashboard endpoint serves.
pub fn records(rows: &[Row]) -> Vec<RowRecord> {
    rows.iter().map(Row::to_record).collect()
}

pub fn write_json<W: Write>(mut out: W, rows: &[Row]) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, &records(rows))
        .map_err(|e| PremiumError::Export(e.to_string()))?;
    out.flush()?;
    Ok(())
}

pub fn write_wide_file(path: &Path, rows: &[Row], deltas: &TargetDeltas) -> Result<()> {
    write_wide(open(path)?, rows, deltas)?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn write_details_file(path: &Path, rows: &[Row]) -> Result<()> {
    write_details(open(path)?, rows)?;
    info!("Wrote details to {}", path.display());
    Ok(())
}

pub fn write_json_file(path: &Path, rows: &[Row]) -> Result<()> {
    write_json(open(path)?, rows)?;
    info!("Wrote JSON to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use premium_common::{Cell, SymbolEntry};

    fn sample_rows(deltas: &TargetDeltas) -> Vec<Row> {
        let mut aapl = Row::new(&SymbolEntry::new("AAPL", 10), Some(150.5), deltas);
        aapl.deltas[0].strike = Cell::Value(155.0);
        aapl.deltas[0].premium = Cell::Value(2.1);
        aapl.deltas[0].notional = Cell::Value(21.0);
        let spy = Row::new(&SymbolEntry::without_shares("SPY"), None, deltas);
        vec![aapl, spy]
    }

    #[test]
    fn test_wide_export_layout() {
        // Given
        let deltas = TargetDeltas::new(vec![0.05, 0.10]).unwrap();
        let rows = sample_rows(&deltas);
        let mut buf = Vec::new();

        // When
        write_wide(&mut buf, &rows, &deltas).unwrap();

        // Then
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "symbol,UnderlyingPrice,Shares,0.05S,0.05P,0.05N,0.10S,0.10P,0.10N"
        );
        assert_eq!(lines[1], "AAPL,150.5,10,155,2.1,21,,,");
        assert_eq!(lines[2], "SPY,,,,,,,,");
    }

    #[test]
    fn test_details_export_has_line_per_delta() {
        let deltas = TargetDeltas::new(vec![0.05, 0.10]).unwrap();
        let rows = sample_rows(&deltas);
        let mut buf = Vec::new();

        write_details(&mut buf, &rows).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + 2 * 2);
        assert_eq!(lines[0], DETAIL_COLUMNS.join(","));
        assert_eq!(lines[1], "AAPL,150.5,10,0.05,155,2.1,21");
        assert_eq!(lines[2], "AAPL,150.5,10,0.10,,,");
    }

    #[test]
    fn test_json_records_keep_column_order() {
        let deltas = TargetDeltas::new(vec![0.05]).unwrap();
        let rows = sample_rows(&deltas);
        let mut buf = Vec::new();

        write_json(&mut buf, &rows).unwrap();

        let parsed: Vec<RowRecord> = serde_json::from_slice(&buf).unwrap();
        let keys: Vec<&String> = parsed[0].keys().collect();
        assert_eq!(keys, deltas.column_names().iter().collect::<Vec<_>>());
        assert_eq!(parsed[1]["UnderlyingPrice"], serde_json::json!(""));
        assert_eq!(parsed[0]["0.05P"], serde_json::json!(2.1));
    }
}
