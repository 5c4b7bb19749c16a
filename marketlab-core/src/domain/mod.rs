//! Domain types for MarketLab.

pub mod bar;
pub mod environment;
pub mod listing;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod trade;
pub mod validation;

pub use bar::Bar;
pub use environment::{Board, Channel, Market, TradingEnvironment};
pub use listing::ListingInfo;
pub use order::{Order, OrderSide, OrderStatus};
pub use portfolio::{Portfolio, PortfolioError};
pub use position::Position;
pub use signal::{Signal, SignalAction};
pub use trade::{Commission, Trade};
pub use validation::ValidationResult;
