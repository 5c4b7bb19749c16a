//! Market-microstructure rules: symbol classification, lot sizes, order validation.

pub mod classifier;
pub mod lot_size;
pub mod validator;

pub use classifier::{ClassifyError, SymbolClassifier};
pub use lot_size::{LotSizeError, LotSizeRules};
pub use validator::{PriceLimits, TradingRulesValidator};
