use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::PremiumError;

/// Prefix carried by index tickers (e.g. `I:SPX`).
pub const INDEX_PREFIX: &str = "I:";

/// One flat output record, keyed by column name in emission order.
pub type RowRecord = serde_json::Map<String, serde_json::Value>;

/// An underlying symbol and the share count used as the notional multiplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub symbol: String,
    /// `None` when the caller supplied no share count at all.
    pub shares: Option<i64>,
}

impl SymbolEntry {
    pub fn new(symbol: impl Into<String>, shares: i64) -> Self {
        Self {
            symbol: symbol.into(),
            shares: Some(shares),
        }
    }

    pub fn without_shares(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            shares: None,
        }
    }

    pub fn is_index(&self) -> bool {
        self.symbol.starts_with(INDEX_PREFIX)
    }
}

/// Option contract type requested for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Call,
    Put,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Call => "call",
            ContractType::Put => "put",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Ok(ContractType::Call),
            "put" | "p" => Ok(ContractType::Put),
            other => Err(format!("unknown contract type '{other}' (expected call or put)")),
        }
    }
}

/// Column key for a target delta: two decimals, e.g. `0.05`.
pub fn delta_key(delta: f64) -> String {
    format!("{delta:.2}")
}

/// The fixed, ascending, de-duplicated set of target deltas for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct TargetDeltas(Vec<f64>);

impl TargetDeltas {
    /// Validate, sort and de-duplicate (by column key) a set of deltas.
    pub fn new(values: Vec<f64>) -> Result<Self, PremiumError> {
        if values.is_empty() {
            return Err(PremiumError::Configuration(
                "target delta set must not be empty".to_string(),
            ));
        }

        if let Some(bad) = values
            .iter()
            .find(|d| !d.is_finite() || **d <= 0.0 || **d > 1.0)
        {
            return Err(PremiumError::Configuration(format!(
                "target delta {bad} is outside (0, 1]"
            )));
        }

        let mut sorted = values;
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted.dedup_by(|a, b| delta_key(*a) == delta_key(*b));

        Ok(Self(sorted))
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column names of the wide table: fixed columns then S/P/N per delta.
    pub fn column_names(&self) -> Vec<String> {
        let mut columns = vec![
            Row::SYMBOL_KEY.to_string(),
            Row::PRICE_KEY.to_string(),
            Row::SHARES_KEY.to_string(),
        ];
        for delta in &self.0 {
            let key = delta_key(*delta);
            columns.push(format!("{key}S"));
            columns.push(format!("{key}P"));
            columns.push(format!("{key}N"));
        }
        columns
    }
}

impl Default for TargetDeltas {
    /// 0.05 stepped up to 0.50.
    fn default() -> Self {
        Self((1..=10).map(|i| (i * 5) as f64 / 100.0).collect())
    }
}

impl TryFrom<Vec<f64>> for TargetDeltas {
    type Error = PremiumError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<TargetDeltas> for Vec<f64> {
    fn from(deltas: TargetDeltas) -> Self {
        deltas.0
    }
}

/// Market state of one option contract at fetch time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractSnapshot {
    /// Signed delta; `None` when the feed had no usable greek.
    pub delta: Option<f64>,
    pub strike: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_trade: Option<f64>,
    pub prev_close: Option<f64>,
}

/// A table cell: a number, or the empty sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Cell {
    Value(f64),
    #[default]
    Empty,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Value(v) => Some(*v),
            Cell::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text form used by the tabular exports.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Value(v) => v.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Value)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Value(v) => serializer.serialize_f64(*v),
            Cell::Empty => serializer.serialize_str(""),
        }
    }
}

/// Strike, premium and notional for one target delta.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaCells {
    pub delta: f64,
    pub strike: Cell,
    pub premium: Cell,
    pub notional: Cell,
}

impl DeltaCells {
    pub fn empty(delta: f64) -> Self {
        Self {
            delta,
            strike: Cell::Empty,
            premium: Cell::Empty,
            notional: Cell::Empty,
        }
    }
}

/// One output row per symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub symbol: String,
    pub underlying_price: Cell,
    pub shares: Option<i64>,
    pub deltas: Vec<DeltaCells>,
}

impl Row {
    pub const SYMBOL_KEY: &'static str = "symbol";
    pub const PRICE_KEY: &'static str = "UnderlyingPrice";
    pub const SHARES_KEY: &'static str = "Shares";

    /// A row with every delta-derived cell set to the empty sentinel.
    pub fn new(entry: &SymbolEntry, underlying_price: Option<f64>, deltas: &TargetDeltas) -> Self {
        Self {
            symbol: entry.symbol.clone(),
            underlying_price: underlying_price.into(),
            shares: entry.shares,
            deltas: deltas.values().iter().map(|d| DeltaCells::empty(*d)).collect(),
        }
    }

    pub fn shares_cell(&self) -> Cell {
        self.shares.map(|s| s as f64).into()
    }

    /// Number of fields this row emits: 3 fixed plus 3 per delta.
    pub fn field_count(&self) -> usize {
        3 + 3 * self.deltas.len()
    }

    pub fn cells_for(&self, delta: f64) -> Option<&DeltaCells> {
        let key = delta_key(delta);
        self.deltas.iter().find(|c| delta_key(c.delta) == key)
    }

    /// Flat record in column order, as served to the dashboard.
    pub fn to_record(&self) -> RowRecord {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => RowRecord::new(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.field_count()))?;
        map.serialize_entry(Self::SYMBOL_KEY, &self.symbol)?;
        map.serialize_entry(Self::PRICE_KEY, &self.underlying_price)?;
        match self.shares {
            Some(shares) => map.serialize_entry(Self::SHARES_KEY, &shares)?,
            None => map.serialize_entry(Self::SHARES_KEY, &Cell::Empty)?,
        }
        for cells in &self.deltas {
            let key = delta_key(cells.delta);
            map.serialize_entry(&format!("{key}S"), &cells.strike)?;
            map.serialize_entry(&format!("{key}P"), &cells.premium)?;
            map.serialize_entry(&format!("{key}N"), &cells.notional)?;
        }
        map.end()
    }
}
