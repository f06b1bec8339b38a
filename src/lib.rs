//! # LP CRM
//!
//! Relationship tracking for a fundraising team: limited partners, general
//! partners, distributors, their people, the funds being raised, meeting
//! notes and follow-up todos.
//!
//! Data starts life in a Notion workspace and is pulled in with batch import
//! jobs; after that the SQLite database is the source of truth and is served
//! over a small REST API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Exports    │──▶│ Import jobs  │──▶│    SQLite    │
//! │ Notion / CSV │   │ upsert+links │   │ entities+FKs │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                    ┌──────────┐        ┌──────────┐
//!                    │   CLI    │        │   HTTP   │
//!                    │  (crm)   │        │  (axum)  │
//!                    └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crm init                          # create database
//! crm import all --dir ./exports    # import the newest export of each kind
//! crm import notes ./exports/notes.json
//! crm funnel refresh                # rebuild last-contact columns
//! crm serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Entity rows and enums |
//! | [`repo`] | Generic row helpers behind every resource |
//! | [`links`] | Junction tables |
//! | [`funnel`] | Sales funnel and roadshow status |
//! | [`todos`] | Follow-ups and recurrence |
//! | [`notion`] | Notion property extraction and block rendering |
//! | [`import`] | Notion JSON and CSV import jobs |
//! | [`exports`] | Export file discovery |
//! | [`server`] | REST API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod db;
pub mod distributors;
pub mod error;
pub mod exports;
pub mod funds;
pub mod funnel;
pub mod gps;
pub mod import;
pub mod links;
pub mod lps;
pub mod migrate;
pub mod models;
pub mod notes;
pub mod notion;
pub mod people;
pub mod recurrence;
pub mod repo;
pub mod roadshows;
pub mod server;
pub mod stats;
pub mod todos;
