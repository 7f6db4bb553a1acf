// Import module - export file parsers and the schema-driven normalizer

pub mod account;
pub mod equity;
pub mod futures;
pub mod positions;
pub mod schema;
pub mod sheet;

pub use account::read_account_total_asset;
pub use equity::{read_unit_assets, EquityAssetRow};
pub use futures::{read_benchmark_return, read_futures_assets, FuturesAssetRow, DEFAULT_BENCHMARK};
pub use positions::{read_positions, PositionRow};
