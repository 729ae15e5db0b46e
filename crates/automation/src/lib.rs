//! Position automation: deterministic take-profit, stop-loss, and
//! trailing-stop enforcement over open positions. No discretion in the
//! sell path — all rules are evaluated mechanically every tick.

pub mod engine;
pub mod triggers;

pub use engine::{CloseOutcome, PositionAutomationEngine, TickReport};
pub use triggers::{check_triggers, SellTrigger};
