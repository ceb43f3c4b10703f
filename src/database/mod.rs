//! # Database Operations
//!
//! Connection management for the two logical databases and catalog queries
//! against the destination.
//!
//! ## Key Components
//!
//! - [`connection`] - Logical connection resolution and pool lifecycle
//! - [`catalog`] - `information_schema` existence and column lookups
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use airflow_observability::config::ConnectionsConfig;
//! use airflow_observability::database::ConnectionProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = ConnectionProvider::new(Arc::new(ConnectionsConfig::default()));
//! let destination = provider.resolve("destination").await?;
//! assert!(provider.health_check("destination").await?);
//! provider.close_all().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod connection;

pub use connection::ConnectionProvider;
