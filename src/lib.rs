//! GATT client session controller.
//!
//! [`infrastructure::bluetooth::SessionController`] drives a host GATT
//! transport through scanning, connection, paged attribute discovery,
//! reads, notifications and write / execute-write pairs.
//! [`infrastructure::bluetooth::GattService`] runs it on a tokio task.
//! Device integrations such as [`domain::shield::ShieldProfile`] and
//! [`domain::feeder::CatFeeder`] react to its events.

pub mod domain;
pub mod infrastructure;
