use chrono::NaiveDate;
use premium_common::{
    ApiKey, ContractType, PremiumError, Result, Row, RunConfig, SymbolEntry, TargetDeltas,
};
use std::sync::Arc;
use tracing::info;

use crate::assembler::RowAssembler;
use crate::chain::ChainFetcher;
use crate::expiration::next_friday;
use crate::fetcher::RateLimitedFetcher;
use crate::prices::PriceResolver;
use crate::transport::{HttpTransport, ReqwestTransport};

/// End-to-end table generation: prices, then one chain per symbol.
pub struct PremiumPipeline {
    resolver: PriceResolver,
    assembler: RowAssembler,
}

impl PremiumPipeline {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: ApiKey, config: &RunConfig) -> Self {
        let fetcher = Arc::new(RateLimitedFetcher::new(
            transport,
            api_key,
            config.retry.clone(),
        ));

        Self {
            resolver: PriceResolver::new(fetcher.clone(), config),
            assembler: RowAssembler::new(ChainFetcher::new(fetcher, config)),
        }
    }

    /// Reads the credential from the environment and talks to the live API.
    ///
    /// Fails before any request when the key is missing or a placeholder.
    pub fn from_env(config: &RunConfig) -> Result<Self> {
        let api_key = ApiKey::from_env()?;
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::new(transport, api_key, config))
    }

    /// Rows for `symbols` in input order, priced against the next Friday
    /// expiration relative to `today`.
    pub async fn generate(
        &self,
        symbols: &[SymbolEntry],
        deltas: &TargetDeltas,
        contract_type: ContractType,
        today: NaiveDate,
    ) -> Result<Vec<Row>> {
        if symbols.is_empty() {
            return Err(PremiumError::Input("no symbols to process".to_string()));
        }

        let expiration = next_friday(today);
        info!(
            "Generating {} rows for {} symbols, expiration {}",
            contract_type,
            symbols.len(),
            expiration
        );

        let prices = self.resolver.resolve(symbols, today).await;
        info!("Resolved {}/{} underlying prices", prices.len(), symbols.len());

        let rows = self
            .assembler
            .assemble(symbols, deltas, &prices, expiration, contract_type)
            .await;
        info!("Assembled {} rows", rows.len());

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockHttpTransport;

    #[tokio::test]
    async fn test_empty_symbol_list_is_rejected_without_requests() {
        // Given - a transport that must never be called
        let mut transport = MockHttpTransport::new();
        transport.expect_get().never();
        let pipeline = PremiumPipeline::new(
            Arc::new(transport),
            ApiKey::new("test-key").unwrap(),
            &RunConfig::default(),
        );

        // When
        let result = pipeline
            .generate(
                &[],
                &TargetDeltas::default(),
                ContractType::Call,
                NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            )
            .await;

        // Then
        assert!(matches!(result, Err(PremiumError::Input(_))));
    }
}
