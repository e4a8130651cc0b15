//! OmniDrive Core - Domain model and port definitions
//!
//! This crate contains the backend-agnostic core shared by every other crate:
//! - **Domain entities** - `FileRecord`, `Catalog`, `SyncPlan`, `SyncReport`,
//!   `Workflow`, `WorkflowRun`, `SessionRecord`
//! - **Port definitions** - Traits for adapters: `IStorageAdapter`, `ISessionStore`
//! - **Use cases** - `SessionUseCase` for named session records
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! The domain module is pure data and state transitions with no I/O.
//! Ports define the trait interfaces that storage backends and the
//! session store implement. Engines in `omnidrive-sync` and
//! `omnidrive-workflow` depend only on these ports, never on a concrete
//! backend type.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
