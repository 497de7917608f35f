//! Type definitions for the risk scorer

pub mod alert;
pub mod score;
pub mod transaction;

pub use alert::FraudAlert;
pub use score::{BatchResult, BatchRow, BatchSummary, RiskTier, RowError, ScoreResult};
pub use transaction::{AnonymisedComponents, StreamTransaction, TransactionInput};
