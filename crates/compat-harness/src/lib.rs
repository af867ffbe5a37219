//! Runs the same operations against a target and a reference server and
//! asserts that replies, errors and side effects agree.

pub mod assert;
pub mod backend;
pub mod check;
pub mod config;
pub mod error;
pub mod helpers;
pub mod logging;
pub mod operation;
pub mod scenario;
pub mod server_error;
pub mod suite;

pub use backend::{
    BulkWriteResult, Collection, CompatSetup, Context, Cursor, FindOptions, IndexModel, Setup,
    SetupOpts, WriteModel,
};
pub use check::{Abort, Checker};
pub use config::{HarnessConfig, TargetKind};
pub use error::HarnessError;
pub use operation::{Observation, Operation, Response};
pub use scenario::{
    Divergence, DivergenceMode, DocumentMode, ErrorMode, Phase, ResultType, Scenario,
    ScenarioReport, Status, SubtestReport,
};
pub use server_error::{
    BulkWriteError, BulkWriteException, CommandError, ServerError, WriteConcernError, WriteError,
    WriteException,
};
pub use suite::{Suite, SuiteReport};
