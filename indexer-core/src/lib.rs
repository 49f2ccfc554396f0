//! Lending Indexer Core
//!
//! Folds the log events of a lending protocol (comptroller, pool tokens,
//! staking rewards) into a queryable set of entities: markets, accounts,
//! positions, credit limits, staking balances and per-event audit records.
//!
//! # Architecture
//!
//! - **Forward-only fold**: one event at a time, in arrival order
//! - **Unit of work**: every event stages its writes and commits them as one batch
//! - **Exact decimals**: integer mantissas become truncated arbitrary-precision decimals
//! - **Dynamic sources**: listed markets and staking pools register themselves
//!
//! # Invariants
//!
//! - `Market.total_supply` changes only on mint and redeem
//! - Pool-token balances change only on transfers, and never on the
//!   market-address leg of a mint or redeem
//! - `CreditLimit.credit_borrow` always equals the borrower's latest account
//!   borrows in that market
//! - Nothing is ever deleted

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

pub mod chain;
pub mod config;
pub mod decimal;
pub mod entities;
pub mod error;
pub mod events;
mod handlers;
pub mod indexer;
pub mod metrics;
pub mod repository;
pub mod sources;
pub mod storage;
pub mod types;

// Re-exports
pub use chain::{CallError, ContractReader, StaticContractReader};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventKind, LogEvent};
pub use indexer::{Indexer, IndexerStats};
pub use repository::{Entity, Repository, Seeded};
pub use sources::{DataSourceRegistry, SourceSet, SourceTemplate};
pub use storage::{EntityStore, MemoryStore, Storage};
pub use types::{Address, EventMeta, TxHash};
