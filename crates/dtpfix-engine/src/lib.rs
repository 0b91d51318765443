//! # dtpfix-engine
//!
//! Fix application and revert for DTP knowledge graphs.
//!
//! ```text
//!   Selector ──► rules (dtpfix-rules) ──► Executor ──► GraphClient
//!                                            │
//!                                            ▼
//!                                     SessionJournal (sessions/*.jsonl)
//!                                            │
//!                                            ▼
//!                                      RevertEngine ──► Executor
//! ```
//!
//! Nodes are processed one at a time and journal lines are written in
//! application order; reverting replays them newest first. The journal is the
//! only recovery mechanism, so a failing journal write aborts the run.

pub mod context;
pub mod error;
pub mod executor;
pub mod journal;
pub mod report;
pub mod revert;
pub mod run;
pub mod selector;

pub use context::{FixContext, DEFAULT_PAGE_SIZE};
pub use error::{ExecutionError, JournalError, RevertConflict, RunError, SelectionError};
pub use executor::{ExecutionOutcome, Executor, Mode, OutcomeStatus, PlannedMutation};
pub use journal::{
    read_session, session_files, SessionEntry, SessionJournal, SessionLog, SESSIONS_DIR,
    SESSION_ENTRY_VERSION_V1,
};
pub use report::{FixCounts, NodeFailure, RunReport};
pub use revert::{EntryRef, FailedEntry, RevertEngine, RevertReport, SkipReason, SkippedEntry};
pub use run::{plan_mutations, Engine};
pub use selector::{select, SelectedNode, Selector};
