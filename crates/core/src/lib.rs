pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod paper;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::{
    AppConfig, AutomationConfig, DatabaseConfig, DispatchConfig, ExecutionConfig, FeeConfig,
    RedisConfig,
};
pub use config_loader::ConfigLoader;
pub use error::SnipeError;
pub use events::{BroadcastNotifier, MigrationEvent, NotificationEvent};
pub use retry::RetryPolicy;
pub use traits::{
    BalanceSource, BuyExecutor, BuyFill, BuyOrder, LockStore, Notifier, NullNotifier,
    PositionStore, PriceSource, SellExecutor, SellFill, SellOrder, SniperStore,
    TokenAnalysisProvider,
};
pub use types::{
    ExitRules, HolderSnapshot, MarketSnapshot, Position, PositionStatus, SniperConfig,
    SniperFilters, TokenAnalysis, VolumeSnapshot, WalletBinding, WalletCustody, LAMPORTS_PER_SOL,
};
