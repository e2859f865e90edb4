pub mod assembler;
pub mod chain;
pub mod decode;
pub mod expiration;
pub mod export;
pub mod fetcher;
pub mod pipeline;
pub mod premium;
pub mod prices;
pub mod selector;
pub mod transport;

pub use assembler::{fill_row, RowAssembler};
pub use chain::ChainFetcher;
pub use expiration::next_friday;
pub use fetcher::RateLimitedFetcher;
pub use pipeline::PremiumPipeline;
pub use prices::{PriceResolver, PriceSource, UnderlyingPrices};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
