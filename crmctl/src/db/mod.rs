//! Database layer for data persistence and access.
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! Repositories borrow a `&mut PgConnection`, so they work the same on a pooled
//! connection and inside a transaction:
//!
//! ```ignore
//! use crmctl::db::handlers::Customers;
//!
//! let mut tx = pool.begin().await?;
//! let mut customers = Customers::new(&mut tx);
//! let customer = customers.create(&request).await?;
//! tx.commit().await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
