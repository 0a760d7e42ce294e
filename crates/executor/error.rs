use std::fmt;

use replay_state::StateError;
use thiserror::Error;

/// Error type shared by providers, processors and extensions.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Failure of the data source; always fatal.
    #[error("source error: {0}")]
    Source(String),
    /// Failure while executing a work item.
    #[error("execution error: {0}")]
    Execution(String),
    /// Mismatch between the replayed state and the recorded expectation.
    #[error("{context}\n{diff}")]
    Validation { context: String, diff: ValidationDiff },
    /// Extension initialisation failure.
    #[error("setup error: {0}")]
    Setup(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Block: {block} Transaction: {transaction}; {source}")]
    AtItem {
        block: u64,
        transaction: u32,
        #[source]
        source: Box<ReplayError>,
    },
    #[error("{}", join_messages(.0))]
    Multiple(Vec<ReplayError>),
    #[error("state-db cannot be replaced once the run loop has started")]
    StateSealed,
    #[error("no state-db is available")]
    MissingState,
    #[error("unknown parallelism granularity: {0}")]
    InvalidGranularity(String),
    #[error("run aborted")]
    Aborted,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplayError {
    /// Attaches the coordinates of the work item the error originated from.
    pub fn at(self, block: u64, transaction: u32) -> Self {
        match self {
            err @ ReplayError::AtItem { .. } => err,
            err => ReplayError::AtItem {
                block,
                transaction,
                source: Box::new(err),
            },
        }
    }

    /// Collapses a list of errors: none is success, one is returned as is and
    /// more are wrapped into `Multiple`.
    pub fn join(mut errors: Vec<ReplayError>) -> Result<(), ReplayError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ReplayError::Multiple(errors)),
        }
    }

    /// Combines two optional outcomes, keeping both errors if present.
    pub fn combine(
        first: Result<(), ReplayError>,
        second: Result<(), ReplayError>,
    ) -> Result<(), ReplayError> {
        let errors = [first.err(), second.err()].into_iter().flatten().collect();
        Self::join(errors)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ReplayError::Aborted)
    }
}

fn join_messages(errors: &[ReplayError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Structured description of a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationDiff {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub mismatches: Vec<FieldMismatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub subject: String,
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl ValidationDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.mismatches.is_empty()
    }

    pub fn mismatch(
        &mut self,
        subject: impl fmt::Display,
        field: &'static str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) {
        self.mismatches.push(FieldMismatch {
            subject: subject.to_string(),
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    /// Returns `Ok` when no difference was recorded.
    pub fn into_result(self, context: impl Into<String>) -> Result<(), ReplayError> {
        if self.is_empty() {
            return Ok(());
        }
        Err(ReplayError::Validation {
            context: context.into(),
            diff: self,
        })
    }
}

impl fmt::Display for ValidationDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for missing in &self.missing {
            writeln!(f, "  missing: {missing}")?;
        }
        for extra in &self.extra {
            writeln!(f, "  extra: {extra}")?;
        }
        for m in &self.mismatches {
            writeln!(
                f,
                "  {} {} mismatch: expected {}, got {}",
                m.subject, m.field, m.expected, m.actual
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_item_prefixes_coordinates_once() {
        let err = ReplayError::Execution("out of gas".into()).at(10, 2).at(11, 3);
        assert_eq!(
            err.to_string(),
            "Block: 10 Transaction: 2; execution error: out of gas"
        );
    }

    #[test]
    fn join_keeps_every_error() {
        assert!(ReplayError::join(vec![]).is_ok());
        let single = ReplayError::join(vec![ReplayError::Setup("a".into())]).unwrap_err();
        assert!(matches!(single, ReplayError::Setup(_)));
        let multiple = ReplayError::join(vec![
            ReplayError::Setup("a".into()),
            ReplayError::Setup("b".into()),
        ])
        .unwrap_err();
        assert_eq!(multiple.to_string(), "setup error: a\nsetup error: b");
    }

    #[test]
    fn empty_diff_is_success() {
        assert!(ValidationDiff::default().into_result("ok").is_ok());
        let mut diff = ValidationDiff::default();
        diff.missing.push("account 0x01".into());
        diff.mismatch("account 0x02", "nonce", 1, 2);
        let err = diff.into_result("block 5 tx 1").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing: account 0x01"));
        assert!(msg.contains("account 0x02 nonce mismatch: expected 1, got 2"));
    }
}
