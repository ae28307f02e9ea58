// Raffle View
// Data side of the raffle front end: fetches raffles from the indexer with an
// on-chain fallback, derives display state, and gates wallet transactions.

// Core modules
pub mod config;
pub mod error;
pub mod raffle_state;
pub mod utils;

// Data sources
pub mod abi;
pub mod fetcher;
#[cfg(feature = "http")]
pub mod http;
pub mod indexer;
pub mod rpc;

// Derived views
pub mod status;
pub mod views;

// Wallet and transactions
pub mod gate;
pub mod session;
pub mod transactions;

pub use config::ClientConfig;
pub use error::{ErrorKind, RaffleClientError, UserNote};
pub use fetcher::{merge_by_address, FetchOutcome, Fetched, LatestRequest, RaffleFetcher, Source};
pub use raffle_state::{Address, Raffle, RawStatus};
pub use status::{resolve_status, DisplayStatus, StatusTicker};
