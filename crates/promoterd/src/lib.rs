//! promoterd library - exposes modules for testing.

pub mod activator;
pub mod cli;
pub mod fsops;
pub mod locator;
pub mod logging;
pub mod promotion;
pub mod scanner;
pub mod watcher;

pub use activator::{CommandServiceManager, ServiceActivator, ServiceManager};
pub use promotion::{PromotionEngine, PromotionOutcome};
pub use watcher::{CycleReport, SlotOutcome, SlotReport, Watcher};
