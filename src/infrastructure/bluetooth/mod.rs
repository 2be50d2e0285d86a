//! Bluetooth Module
//!
//! GATT client session against a host-provided BLE transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      GattService                         │
//! │   (async loop: host callbacks, UI commands, timers)      │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SessionController                       │
//! └──┬────────────┬──────────────┬──────────────┬───────────┘
//!    │            │              │              │
//!    ▼            ▼              ▼              ▼
//! ┌─────────┐ ┌────────────┐ ┌───────────┐ ┌───────────────┐
//! │ Scanner │ │ Connection │ │ Discovery │ │ WritePipeline │
//! │         │ │            │ │           │ │               │
//! │ - scan  │ │ - handles  │ │ - service │ │ - write then  │
//! │   pass  │ │ - selection│ │   search  │ │   execute     │
//! │ - dedup │ │ - depth    │ │ - paging  │ │               │
//! └─────────┘ └────────────┘ └───────────┘ └───────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │ GattTransport │  (host stack or SimulatedPeripheral)
//!               └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Host GATT client API and its callback events
//! - [`protocol`] - Hex rendering and advertisement parsing
//! - [`scanner`] - Scan pass bookkeeping
//! - [`connection`] - Handles, active link, selection path
//! - [`discovery`] - Service search and cursor-driven enumeration
//! - [`write_pipeline`] - Write / execute-write sequencing
//! - [`controller`] - The session controller
//! - [`service`] - Async runtime driving the controller
//! - [`simulated`] - In-memory peripheral for demos and tests

pub mod connection;
pub mod controller;
pub mod discovery;
pub mod protocol;
pub mod scanner;
pub mod service;
pub mod simulated;
pub mod transport;
pub mod write_pipeline;

// Re-export the main entry points for convenience
pub use controller::SessionController;
pub use service::GattService;
pub use transport::{GattTransport, TransportEvent};
