//! Account Sync Service - batched reconciliation of open-finance accounts.

pub mod config;
pub mod handlers;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod startup;
pub mod sync;
