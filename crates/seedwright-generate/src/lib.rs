//! Model-driven seed data generation.
//!
//! For each table in insert order the engine builds a prompt from the
//! parsed schema, asks a [`ModelClient`] for rows, recovers the record
//! array from whatever text comes back, checks the records against the
//! declared constraints and hands them to a [`RecordStore`].

pub mod checks;
pub mod client;
pub mod engine;
pub mod errors;
pub mod insert;
pub mod model;
pub mod output;
pub mod planner;
pub mod prompt;
pub mod recover;
pub mod store;

pub use checks::check_records;
pub use client::ModelClient;
pub use engine::{ProgressEvent, SeedEngine};
pub use errors::{GenerationError, RecoveryError};
pub use insert::{InsertStatement, build_insert, insert_batches, quote_ident};
pub use model::{
    GenerateOptions, GenerationReport, Record, RecordCollection, RecordIssue, Stage, TableReport,
    TableStatus,
};
pub use output::csv::CsvStore;
pub use planner::{GenerationTask, PlanOptions, plan_tables};
pub use prompt::{PromptRequest, ReferencePool, Style, build_prompt};
pub use recover::{Recovery, Repair, recover, recover_records};
pub use store::{MemoryStore, RecordStore};
