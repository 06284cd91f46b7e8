//! # Finance Report ETL
//!
//! A scheduled extract-load job that incrementally copies weekly seller
//! finance reports from a paginated, rate-limited HTTP API into a relational
//! table, adding a column whenever the API starts sending a new field.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌────────────┐   ┌────────────┐
//! │ Watermark  │──▶│  Window  │──▶│ Paginator  │──▶│ Accumulate │
//! │ MAX(date)  │   │ Mon..Sun │   │ 61s, rrdid │   │ RecordSet  │
//! └─────▲──────┘   └──────────┘   └────────────┘   └─────┬──────┘
//!       │                                                ▼
//!  ┌────┴──────────────────────┐               ┌──────────────────┐
//!  │ Warehouse (PG / SQLite)   │◀──────────────│ Schema-evolving  │
//!  │ target table              │  ADD COLUMN   │ loader (append)  │
//!  └───────────────────────────┘               └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export DATABASE_URL=postgres://etl@db/reports WB_API_TOKEN=...
//! finetl init                   # create the target table
//! finetl status                 # watermark and next window
//! finetl run                    # fetch, load, notify (from cron)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Run error taxonomy |
//! | [`models`] | Core data types |
//! | [`watermark`] | Latest loaded date |
//! | [`window`] | Weekly fetch window |
//! | [`fetch`] | Rate-limited cursor pagination |
//! | [`report_api`] | HTTP report source |
//! | [`accumulate`] | Page concatenation |
//! | [`load`] | Schema reconciliation and append |
//! | [`warehouse`] | Relational store abstraction |
//! | [`pipeline`] | One run, stage by stage |
//! | [`job`] | Connection handling and notification |
//! | [`notify`] | Success / failure notifiers |

pub mod accumulate;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod job;
pub mod load;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod report_api;
pub mod status;
pub mod warehouse;
pub mod warehouse_pg;
pub mod warehouse_sqlite;
pub mod watermark;
pub mod window;
