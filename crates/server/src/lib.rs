//! HTTP surface for the expense requisition workflow, plus the wiring that
//! starts it: configuration, database, engine and the notification worker.

pub mod api;
pub mod bootstrap;
pub mod health;
pub mod notifier;
