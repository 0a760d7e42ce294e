use std::path::PathBuf;

use replay_state::{ArchiveState, StateDb};
use tracing::warn;

use crate::{ErrorReporter, ExecutionResult, ReplayError};

/// Mutable state shared by the executor, the processor and the extensions of
/// one run.
///
/// The state-db handle may be installed or taken only while the context is
/// unsealed, which is the case during the PreRun and PostRun hooks. The
/// executor seals the context for the duration of the block loop.
#[derive(Default)]
pub struct Context {
    state: Option<Box<dyn StateDb>>,
    archive: Option<Box<dyn ArchiveState>>,
    sealed: bool,
    /// Outcome of the most recently processed item.
    pub execution_result: Option<ExecutionResult>,
    /// Sink for non-fatal errors, installed by the error logger.
    pub error_reporter: Option<ErrorReporter>,
    /// Directory backing the state-db, if any.
    pub state_db_path: Option<PathBuf>,
}

impl Context {
    pub fn new(state: Option<Box<dyn StateDb>>) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&dyn StateDb> {
        self.state.as_deref()
    }

    pub fn state_mut(&mut self) -> Option<&mut (dyn StateDb + 'static)> {
        self.state.as_deref_mut()
    }

    pub fn require_state(&mut self) -> Result<&mut (dyn StateDb + 'static), ReplayError> {
        self.state.as_deref_mut().ok_or(ReplayError::MissingState)
    }

    /// Installs `state`, returning the previously installed handle.
    pub fn install_state(
        &mut self,
        state: Box<dyn StateDb>,
    ) -> Result<Option<Box<dyn StateDb>>, ReplayError> {
        if self.sealed {
            return Err(ReplayError::StateSealed);
        }
        Ok(self.state.replace(state))
    }

    pub fn take_state(&mut self) -> Result<Option<Box<dyn StateDb>>, ReplayError> {
        if self.sealed {
            return Err(ReplayError::StateSealed);
        }
        Ok(self.state.take())
    }

    /// Historical view of the block preceding the current one, if acquired.
    pub fn archive(&self) -> Option<&dyn ArchiveState> {
        self.archive.as_deref()
    }

    pub fn archive_mut(&mut self) -> Option<&mut (dyn ArchiveState + 'static)> {
        self.archive.as_deref_mut()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Forwards a non-fatal error to the configured reporter. Without one the
    /// error is only logged.
    pub fn report_error(&self, err: ReplayError) {
        match &self.error_reporter {
            Some(reporter) => {
                if !reporter.report(err) {
                    warn!("Error reporter is closed, dropping error");
                }
            }
            None => warn!(%err, "Ignoring execution failure"),
        }
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn unseal(&mut self) {
        self.sealed = false;
    }

    pub(crate) fn swap_state<F>(&mut self, f: F)
    where
        F: FnOnce(Box<dyn StateDb>) -> Box<dyn StateDb>,
    {
        if let Some(state) = self.state.take() {
            self.state = Some(f(state));
        }
    }

    pub(crate) fn set_archive(&mut self, archive: Box<dyn ArchiveState>) {
        self.archive = Some(archive);
    }

    pub(crate) fn take_archive(&mut self) -> Option<Box<dyn ArchiveState>> {
        self.archive.take()
    }
}

#[cfg(test)]
mod tests {
    use replay_state::InMemoryStateDb;

    use super::*;

    #[test]
    fn sealed_context_rejects_state_changes() {
        let mut ctx = Context::new(Some(Box::new(InMemoryStateDb::new())));
        ctx.seal();
        assert!(matches!(
            ctx.install_state(Box::new(InMemoryStateDb::new())),
            Err(ReplayError::StateSealed)
        ));
        assert!(matches!(ctx.take_state(), Err(ReplayError::StateSealed)));
        assert!(ctx.require_state().is_ok());

        ctx.unseal();
        assert!(ctx.take_state().unwrap().is_some());
        assert!(matches!(ctx.require_state(), Err(ReplayError::MissingState)));
    }
}
