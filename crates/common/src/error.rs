use std::time::Duration;
use thiserror::Error;

/// Errors raised while building the premiums table.
///
/// Only `Configuration` and `Input` stop a run. Everything else is scoped to
/// a single symbol (or a single delta cell) and is logged, not propagated.
#[derive(Error, Debug)]
pub enum PremiumError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("rate limit exhausted after {attempts} attempts: {url}")]
    RateLimitExhausted { url: String, attempts: u32 },

    #[error("upstream returned HTTP {status} for {url}: {body}")]
    UpstreamHttp {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request timed out after {timeout:?}: {url}")]
    Timeout { url: String, timeout: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no usable contract or premium for {symbol} at delta {delta:.2}")]
    PartialResolution { symbol: String, delta: f64 },

    #[error("failed to build row for {symbol}: {source}")]
    SymbolProcessing {
        symbol: String,
        #[source]
        source: Box<PremiumError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export failed: {0}")]
    Export(String),
}

impl PremiumError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PremiumError::Configuration(_) | PremiumError::Input(_))
    }

    /// Wrap a failure that happened while building one symbol's row.
    pub fn for_symbol(symbol: &str, source: PremiumError) -> Self {
        PremiumError::SymbolProcessing {
            symbol: symbol.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for PremiumError {
    fn from(err: serde_json::Error) -> Self {
        PremiumError::InvalidResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PremiumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_and_input_are_fatal() {
        assert!(PremiumError::Configuration("no key".into()).is_fatal());
        assert!(PremiumError::Input("no symbols".into()).is_fatal());

        let scoped = vec![
            PremiumError::RateLimitExhausted {
                url: "u".into(),
                attempts: 5,
            },
            PremiumError::UpstreamHttp {
                url: "u".into(),
                status: 500,
                body: "oops".into(),
            },
            PremiumError::Timeout {
                url: "u".into(),
                timeout: Duration::from_secs(30),
            },
            PremiumError::PartialResolution {
                symbol: "AAPL".into(),
                delta: 0.3,
            },
        ];
        for err in scoped {
            assert!(!err.is_fatal(), "{err} should be symbol-scoped");
        }
    }

    #[test]
    fn test_symbol_processing_keeps_source() {
        let err = PremiumError::for_symbol(
            "MSFT",
            PremiumError::UpstreamHttp {
                url: "https://example.test".into(),
                status: 404,
                body: "not found".into(),
            },
        );

        let message = err.to_string();
        assert!(message.contains("MSFT"));
        assert!(message.contains("404"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
