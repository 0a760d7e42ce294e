//! Generic replay engine: an [`Executor`] pulls [`WorkItem`]s from a
//! [`Provider`], applies them through a [`Processor`] and notifies an ordered
//! list of [`Extension`]s around the run, each block and each transaction.

mod context;
mod decorator;
pub mod error;
mod extension;
mod failure;
mod processor;
mod provider;
mod reporter;
mod run;
mod types;

pub use context::Context;
pub use decorator::{DecoratorChain, StateDecorator};
pub use error::{FieldMismatch, ReplayError, ValidationDiff};
pub use extension::{Extension, ExtensionList};
pub use failure::FailureBudget;
pub use processor::Processor;
pub use provider::{Consumer, Provider};
pub use reporter::{ErrorQueue, ErrorReporter, ErrorStream};
pub use run::{Executor, RunParams};
pub use types::{Cursor, ExecutionResult, Granularity, PSEUDO_TX, WorkItem};
