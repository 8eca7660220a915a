//! TLI Analyzer - traces YDB transaction lock invalidations to their culprits
//!
//! A transaction whose optimistic locks were broken only learns about it at
//! commit time. This library scans the database's diagnostic log latest-first
//! and links each invalidated ("victim") transaction back to the transaction
//! that broke its lock ("culprit"), together with both sides' statements.
//!
//! Pipeline: [`log_sorter`] orders raw lines, [`log_parser`] turns them into
//! [`log_record::LogRecord`]s, [`correlator`] builds
//! [`chain::LockInvalidationChain`]s and the output modules render reports.

pub mod analyzer;
pub mod chain;
pub mod cli;
pub mod config;
pub mod correlator;
pub mod error;
pub mod log_parser;
pub mod log_record;
pub mod log_sorter;
pub mod report;
pub mod sql_output;
pub mod summary_output;
pub mod yaml_output;
