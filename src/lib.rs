//! Vigil - continuous verification scheduler
//!
//! Vigil decides when to collect metric and log data for monitored
//! services, drives raw logs through a multi-level clustering pipeline, and
//! queues analysis tasks for an external analysis engine with dedup,
//! leasing, retries and backoff.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, port traits and errors
//! - **Service Layer** (`services`): window arithmetic and the scheduler
//! - **Adapters** (`adapters`): SQLite task store and the manager HTTP client
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{Config, MonitoredConfiguration};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ContinuousVerificationService, TriggerKind};
