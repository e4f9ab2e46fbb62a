//! mailrotor Storage - Database access layer
//!
//! This crate provides the PostgreSQL-backed persistence for mailrotor:
//! delivery servers, usage logs, customers, sending/tracking domains and
//! the transactional-email queue.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
