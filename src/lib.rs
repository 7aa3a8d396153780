//! Autonomous multi-agent orchestrator for Bitcoin market intelligence and
//! simulated portfolio trading. Re-exports every component so
//! integration tests and the `run`/`cycle-once`/`hunter-once`/`status` CLI
//! subcommands in `main.rs` can build a wired-up `Orchestrator` + `MarketHunterAgent`
//! pair without duplicating construction logic.

pub mod agent;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod decision_logger;
pub mod domain;
pub mod errors;
pub mod expert;
pub mod learning;
pub mod logging;
pub mod market_data;
pub mod market_hunter;
pub mod message_bus;
pub mod metrics;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod store;
