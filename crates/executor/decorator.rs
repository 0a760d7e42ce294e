use replay_state::StateDb;

/// Wraps a state-db handle with additional behaviour, e.g. call logging.
pub trait StateDecorator {
    fn name(&self) -> &str;
    fn decorate(&self, inner: Box<dyn StateDb>) -> Box<dyn StateDb>;
}

/// Ordered list of decorators applied once per run, after every PreRun hook
/// has completed and before the first block is opened. The first decorator
/// ends up innermost.
#[derive(Default)]
pub struct DecoratorChain {
    decorators: Vec<Box<dyn StateDecorator>>,
}

impl DecoratorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, decorator: impl StateDecorator + 'static) -> Self {
        self.decorators.push(Box::new(decorator));
        self
    }

    pub fn push(&mut self, decorator: Box<dyn StateDecorator>) {
        self.decorators.push(decorator);
    }

    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.decorators.iter().map(|d| d.name()).collect()
    }

    pub fn apply(&self, state: Box<dyn StateDb>) -> Box<dyn StateDb> {
        self.decorators
            .iter()
            .fold(state, |state, decorator| decorator.decorate(state))
    }
}

impl std::fmt::Debug for DecoratorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
