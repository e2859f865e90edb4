use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use premium_common::symbols::parse_symbol_override;
use premium_common::{
    ApiKey, ContractType, Row, RowRecord, RunConfig, SymbolEntry, TargetDeltas,
};
use premium_node::{export, HttpTransport, PremiumPipeline, ReqwestTransport};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Symbols served when the request carries no override.
pub const DEFAULT_SYMBOLS: [&str; 5] = ["AAPL", "MSFT", "NVDA", "AMZN", "GOOGL"];

pub const JSON_PATH_ENV: &str = "PREMIUMS_JSON_PATH";
pub const CSV_PATH_ENV: &str = "PREMIUMS_CSV_PATH";

/// What a caller asked for.
#[derive(Debug, Clone)]
pub struct RowRequest {
    pub symbols: Vec<SymbolEntry>,
    /// True when `symbols` came from the query rather than the defaults.
    pub overridden: bool,
    pub contract_type: ContractType,
}

impl RowRequest {
    pub fn new(symbols_param: Option<&str>, contract_type: ContractType) -> Self {
        match parse_symbol_override(symbols_param) {
            Some(symbols) => Self {
                symbols,
                overridden: true,
                contract_type,
            },
            None => Self {
                symbols: DEFAULT_SYMBOLS
                    .iter()
                    .map(|s| SymbolEntry::without_shares(*s))
                    .collect(),
                overridden: false,
                contract_type,
            },
        }
    }

    /// Keep only records for overridden symbols; defaults keep everything.
    /// `None` when an override matched nothing.
    fn filter(&self, records: Vec<RowRecord>) -> Option<Vec<RowRecord>> {
        if !self.overridden {
            return Some(records);
        }
        let wanted: HashSet<&str> = self.symbols.iter().map(|s| s.symbol.as_str()).collect();
        let records = records
            .into_iter()
            .filter(|record| {
                record
                    .get(Row::SYMBOL_KEY)
                    .and_then(Value::as_str)
                    .map(|s| wanted.contains(s.trim().to_uppercase().as_str()))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        (!records.is_empty()).then_some(records)
    }
}

/// One source of Row records.
///
/// `Ok(None)` means the provider has nothing to offer and the next one
/// should be tried.
#[async_trait]
pub trait RowProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn rows(&self, request: &RowRequest) -> Result<Option<Vec<RowRecord>>>;

    /// Errors from a last-resort provider are surfaced instead of skipped.
    fn is_last_resort(&self) -> bool {
        false
    }
}

fn first_existing(paths: &[PathBuf]) -> Option<&Path> {
    let found = paths.iter().find(|p| p.is_file()).map(PathBuf::as_path);
    match found {
        Some(path) => info!("Found: {}", path.display()),
        None => info!("None of these paths exist: {:?}", paths),
    }
    found
}

/// Saved tables hold one contract type; other requests fall through.
fn serves(provider: &str, held: ContractType, request: &RowRequest) -> bool {
    if held != request.contract_type {
        info!(
            "Provider {} holds {} rows, skipping {} request",
            provider, held, request.contract_type
        );
        return false;
    }
    true
}

/// Pre-rendered JSON array of records.
pub struct JsonFileProvider {
    name: String,
    paths: Vec<PathBuf>,
    contract_type: ContractType,
}

impl JsonFileProvider {
    pub fn new(name: impl Into<String>, paths: Vec<PathBuf>, contract_type: ContractType) -> Self {
        Self {
            name: name.into(),
            paths,
            contract_type,
        }
    }

    /// Provider for the path named by `var`, or `None` when unset.
    pub fn from_env(var: &str, contract_type: ContractType) -> Option<Self> {
        let path = std::env::var(var).ok().filter(|p| !p.trim().is_empty())?;
        Some(Self::new(
            format!("json:{var}"),
            vec![PathBuf::from(path)],
            contract_type,
        ))
    }
}

pub fn load_json_records(path: &Path) -> Result<Vec<RowRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON list of records", path.display()))
}

#[async_trait]
impl RowProvider for JsonFileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn rows(&self, request: &RowRequest) -> Result<Option<Vec<RowRecord>>> {
        if !serves(&self.name, self.contract_type, request) {
            return Ok(None);
        }
        let Some(path) = first_existing(&self.paths) else {
            return Ok(None);
        };
        let records = load_json_records(path)?;
        Ok(request.filter(records))
    }
}

/// Wide premiums table, converted to records for the known delta columns.
pub struct CsvFileProvider {
    name: String,
    paths: Vec<PathBuf>,
    deltas: TargetDeltas,
    contract_type: ContractType,
}

impl CsvFileProvider {
    pub fn new(
        name: impl Into<String>,
        paths: Vec<PathBuf>,
        deltas: TargetDeltas,
        contract_type: ContractType,
    ) -> Self {
        Self {
            name: name.into(),
            paths,
            deltas,
            contract_type,
        }
    }

    pub fn from_env(var: &str, deltas: TargetDeltas, contract_type: ContractType) -> Option<Self> {
        let path = std::env::var(var).ok().filter(|p| !p.trim().is_empty())?;
        Some(Self::new(
            format!("csv:{var}"),
            vec![PathBuf::from(path)],
            deltas,
            contract_type,
        ))
    }
}

/// Numeric cell from a CSV field; `$` and thousands separators are tolerated.
fn csv_cell(raw: Option<&str>, integral: bool) -> Value {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Value::String(String::new());
    };
    let cleaned = raw.replace(['$', ','], "");
    if integral {
        if let Ok(n) = cleaned.parse::<i64>() {
            return Value::from(n);
        }
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Value::from(v),
        _ => Value::String(String::new()),
    }
}

fn field<'a>(
    headers: &csv::StringRecord,
    line: &'a csv::StringRecord,
    name: &str,
) -> Option<&'a str> {
    headers.iter().position(|h| h == name).and_then(|i| line.get(i))
}

pub fn load_csv_records(path: &Path, deltas: &TargetDeltas) -> Result<Vec<RowRecord>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("reading {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let columns = deltas.column_names();

    let mut records = Vec::new();
    for result in reader.records() {
        let line = result.with_context(|| format!("parsing {}", path.display()))?;
        let mut record = RowRecord::new();
        for column in &columns {
            let value = if column == Row::SYMBOL_KEY {
                let symbol = field(&headers, &line, column).unwrap_or_default();
                Value::String(symbol.trim().to_string())
            } else {
                csv_cell(field(&headers, &line, column), column == Row::SHARES_KEY)
            };
            record.insert(column.clone(), value);
        }
        records.push(record);
    }
    Ok(records)
}

#[async_trait]
impl RowProvider for CsvFileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn rows(&self, request: &RowRequest) -> Result<Option<Vec<RowRecord>>> {
        if !serves(&self.name, self.contract_type, request) {
            return Ok(None);
        }
        let Some(path) = first_existing(&self.paths) else {
            return Ok(None);
        };
        let records = load_csv_records(path, &self.deltas)?;
        Ok(request.filter(records))
    }
}

type CredentialSource = fn() -> premium_common::Result<ApiKey>;

/// Runs the live pipeline for the requested symbols.
///
/// The HTTP client is built once; the credential is read per request so a
/// key exported after startup is picked up.
pub struct GeneratorProvider {
    config: RunConfig,
    transport: Arc<dyn HttpTransport>,
    credential: CredentialSource,
}

impl GeneratorProvider {
    pub fn new(config: RunConfig) -> Result<Self> {
        let transport = ReqwestTransport::new().context("building HTTP client")?;
        Ok(Self::with_transport(config, Arc::new(transport), ApiKey::from_env))
    }

    pub fn with_transport(
        config: RunConfig,
        transport: Arc<dyn HttpTransport>,
        credential: CredentialSource,
    ) -> Self {
        Self {
            config,
            transport,
            credential,
        }
    }
}

#[async_trait]
impl RowProvider for GeneratorProvider {
    fn name(&self) -> &str {
        "generator"
    }

    async fn rows(&self, request: &RowRequest) -> Result<Option<Vec<RowRecord>>> {
        let api_key = (self.credential)()?;
        let pipeline = PremiumPipeline::new(self.transport.clone(), api_key, &self.config);
        let rows = pipeline
            .generate(
                &request.symbols,
                &self.config.target_deltas,
                request.contract_type,
                Local::now().date_naive(),
            )
            .await?;
        Ok(Some(export::records(&rows)))
    }

    fn is_last_resort(&self) -> bool {
        true
    }
}

/// Failure of the last-resort provider.
#[derive(Debug)]
pub struct GeneratorFailure(pub anyhow::Error);

/// Providers in priority order; the first non-empty answer wins.
#[derive(Clone, Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn RowProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn RowProvider>>) -> Self {
        Self { providers }
    }

    /// Env-named JSON, baked JSON, env-named CSV, baked CSV, then the live
    /// generator, all resolved against `root`.
    ///
    /// Saved tables are call tables.
    pub fn standard(root: &Path, config: RunConfig) -> Result<Self> {
        let parent = root.parent().unwrap_or(root);
        let deltas = config.target_deltas.clone();
        let mut providers: Vec<Arc<dyn RowProvider>> = Vec::new();

        let saved = ContractType::Call;

        if let Some(p) = JsonFileProvider::from_env(JSON_PATH_ENV, saved) {
            providers.push(Arc::new(p));
        }
        providers.push(Arc::new(JsonFileProvider::new(
            "json:baked",
            vec![
                root.join("premiums-ui").join("public").join("premiums.json"),
                parent.join("premiums-ui").join("public").join("premiums.json"),
            ],
            saved,
        )));
        if let Some(p) = CsvFileProvider::from_env(CSV_PATH_ENV, deltas.clone(), saved) {
            providers.push(Arc::new(p));
        }
        providers.push(Arc::new(CsvFileProvider::new(
            "csv:baked",
            vec![root.join("premiums.csv"), parent.join("premiums.csv")],
            deltas,
            saved,
        )));
        providers.push(Arc::new(GeneratorProvider::new(config)?));

        Ok(Self::new(providers))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// File providers that fail are logged and skipped. A failing generator
    /// is reported to the caller.
    pub async fn fetch(&self, request: &RowRequest) -> Result<Vec<RowRecord>, GeneratorFailure> {
        for provider in &self.providers {
            info!("Trying provider {}", provider.name());
            match provider.rows(request).await {
                Ok(Some(records)) if !records.is_empty() => {
                    info!("Provider {} answered with {} rows", provider.name(), records.len());
                    return Ok(records);
                }
                Ok(_) => continue,
                Err(e) if provider.is_last_resort() => return Err(GeneratorFailure(e)),
                Err(e) => warn!("Provider {} failed: {:#}", provider.name(), e),
            }
        }

        warn!("No premiums data available from any provider; returning []");
        Ok(Vec::new())
    }
}
