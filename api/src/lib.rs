pub mod error;
pub mod providers;
pub mod routes;

pub use error::ApiError;
pub use providers::{
    CsvFileProvider, GeneratorProvider, JsonFileProvider, ProviderChain, RowProvider, RowRequest,
};
pub use routes::{router, AppState};
