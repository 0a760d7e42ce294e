use replay_executor::StateDecorator;
use replay_state::{LoggingStateDb, StateDb};

/// Traces every state-db call at debug level under the `state` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProxy;

impl StateDecorator for LoggingProxy {
    fn name(&self) -> &str {
        "logging-proxy"
    }

    fn decorate(&self, inner: Box<dyn StateDb>) -> Box<dyn StateDb> {
        Box::new(LoggingStateDb::new(inner))
    }
}
