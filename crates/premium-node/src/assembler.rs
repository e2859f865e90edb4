use chrono::NaiveDate;
use premium_common::{
    Cell, ContractSnapshot, ContractType, PremiumError, Result, Row, SymbolEntry, TargetDeltas,
};
use tracing::{debug, error, info};

use crate::chain::ChainFetcher;
use crate::premium;
use crate::prices::UnderlyingPrices;
use crate::selector;

/// Builds one row per symbol, in input order.
pub struct RowAssembler {
    chains: ChainFetcher,
}

impl RowAssembler {
    pub fn new(chains: ChainFetcher) -> Self {
        Self { chains }
    }

    /// A symbol whose chain cannot be fetched is logged and left out; every
    /// other symbol still gets its row.
    pub async fn assemble(
        &self,
        symbols: &[SymbolEntry],
        deltas: &TargetDeltas,
        prices: &UnderlyingPrices,
        expiration: NaiveDate,
        contract_type: ContractType,
    ) -> Vec<Row> {
        let mut rows = Vec::with_capacity(symbols.len());

        for entry in symbols {
            let price = prices.get(&entry.symbol);
            info!(
                "Processing {} (shares={:?}) UnderlyingPrice={:?}",
                entry.symbol, entry.shares, price
            );

            match self
                .build_row(entry, price, deltas, expiration, contract_type)
                .await
            {
                Ok(row) => rows.push(row),
                Err(e) => error!("{}", e),
            }
        }

        rows
    }

    async fn build_row(
        &self,
        entry: &SymbolEntry,
        price: Option<f64>,
        deltas: &TargetDeltas,
        expiration: NaiveDate,
        contract_type: ContractType,
    ) -> Result<Row> {
        let snapshots = self
            .chains
            .fetch_all(&entry.symbol, expiration, contract_type)
            .await
            .map_err(|e| PremiumError::for_symbol(&entry.symbol, e))?;

        Ok(fill_row(entry, price, deltas, &snapshots))
    }
}

/// Select, estimate and write the S/P/N cells for every target delta.
///
/// Strike is recorded whenever a contract was chosen, whether or not its
/// premium resolved. Notional needs both a premium and a share count.
pub fn fill_row(
    entry: &SymbolEntry,
    price: Option<f64>,
    deltas: &TargetDeltas,
    snapshots: &[ContractSnapshot],
) -> Row {
    let mut row = Row::new(entry, price, deltas);

    for cells in row.deltas.iter_mut() {
        let Some(chosen) = selector::pick(snapshots, cells.delta) else {
            debug!(
                "{}",
                PremiumError::PartialResolution {
                    symbol: entry.symbol.clone(),
                    delta: cells.delta,
                }
            );
            continue;
        };

        cells.strike = chosen.strike.into();

        match premium::estimate_with_basis(chosen) {
            Some((value, basis)) => {
                debug!(
                    "{} @ {:.2}: premium {} from {:?}",
                    entry.symbol, cells.delta, value, basis
                );
                cells.premium = Cell::Value(value);
                cells.notional = entry
                    .shares
                    .map_or(Cell::Empty, |shares| Cell::Value(shares as f64 * value));
            }
            None => debug!(
                "{}",
                PremiumError::PartialResolution {
                    symbol: entry.symbol.clone(),
                    delta: cells.delta,
                }
            ),
        }
    }

    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(delta: f64, strike: f64, bid: f64, ask: f64) -> ContractSnapshot {
        ContractSnapshot {
            delta: Some(delta),
            strike: Some(strike),
            bid: Some(bid),
            ask: Some(ask),
            ..ContractSnapshot::default()
        }
    }

    #[test]
    fn test_fill_row_end_to_end_values() {
        // Given
        let deltas = TargetDeltas::new(vec![0.05, 0.10]).unwrap();
        let snapshots = vec![
            snapshot(0.051, 155.0, 2.0, 2.2),
            snapshot(0.11, 160.0, 1.0, 1.1),
        ];

        // When
        let row = fill_row(&SymbolEntry::new("AAPL", 10), Some(150.0), &deltas, &snapshots);

        // Then
        assert_eq!(row.underlying_price, Cell::Value(150.0));
        assert_eq!(row.shares, Some(10));
        let low = row.cells_for(0.05).unwrap();
        assert_eq!(low.strike, Cell::Value(155.0));
        assert_eq!(low.premium, Cell::Value(2.1));
        assert_eq!(low.notional, Cell::Value(21.0));
        let high = row.cells_for(0.10).unwrap();
        assert_eq!(high.strike, Cell::Value(160.0));
        assert_eq!(high.premium, Cell::Value(1.05));
        assert_eq!(high.notional, Cell::Value(10.5));
    }

    #[test]
    fn test_empty_chain_gives_all_empty_cells() {
        let deltas = TargetDeltas::default();

        let row = fill_row(&SymbolEntry::new("MSFT", 5), None, &deltas, &[]);

        assert_eq!(row.field_count(), 3 + 3 * deltas.len());
        assert_eq!(row.underlying_price, Cell::Empty);
        assert!(row
            .deltas
            .iter()
            .all(|c| c.strike.is_empty() && c.premium.is_empty() && c.notional.is_empty()));
    }

    #[test]
    fn test_strike_kept_when_premium_unresolved() {
        let deltas = TargetDeltas::new(vec![0.30]).unwrap();
        let snapshots = vec![ContractSnapshot {
            delta: Some(0.3),
            strike: Some(420.0),
            ..ContractSnapshot::default()
        }];

        let row = fill_row(&SymbolEntry::new("SPY", 100), Some(410.0), &deltas, &snapshots);

        let cells = row.cells_for(0.30).unwrap();
        assert_eq!(cells.strike, Cell::Value(420.0));
        assert_eq!(cells.premium, Cell::Empty);
        assert_eq!(cells.notional, Cell::Empty);
    }

    #[test]
    fn test_notional_needs_share_count() {
        let deltas = TargetDeltas::new(vec![0.30]).unwrap();
        let snapshots = vec![snapshot(0.3, 420.0, 1.0, 1.2)];

        let row = fill_row(&SymbolEntry::without_shares("SPY"), None, &deltas, &snapshots);

        let cells = row.cells_for(0.30).unwrap();
        assert_eq!(cells.premium, Cell::Value(1.1));
        assert_eq!(cells.notional, Cell::Empty);
    }

    #[test]
    fn test_zero_shares_gives_zero_notional() {
        let deltas = TargetDeltas::new(vec![0.30]).unwrap();
        let snapshots = vec![snapshot(0.3, 420.0, 1.0, 1.2)];

        let row = fill_row(&SymbolEntry::new("SPY", 0), None, &deltas, &snapshots);

        assert_eq!(row.cells_for(0.30).unwrap().notional, Cell::Value(0.0));
    }
}
