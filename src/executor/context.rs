//! What a test body sees of its case

use super::error::{CaseError, CaseResult};
use crate::lifecycle::{
    AppOutcome, Endpoint, HandleId, LifecycleController, ReadySignal, TeardownWarning,
};
use crate::matrix::TestCase;
use crate::version::Version;

/// Case values plus access to the case's services by name
pub struct CaseContext<'a> {
    case: &'a TestCase,
    controller: &'a mut LifecycleController,
    warnings: Vec<TeardownWarning>,
}

impl<'a> CaseContext<'a> {
    pub fn new(case: &'a TestCase, controller: &'a mut LifecycleController) -> Self {
        Self {
            case,
            controller,
            warnings: Vec::new(),
        }
    }

    pub fn case(&self) -> &TestCase {
        self.case
    }

    /// Raw axis value
    pub fn value(&self, axis: &str) -> CaseResult<&str> {
        Ok(self.case.require(axis)?)
    }

    /// Axis value parsed as a version
    pub fn version(&self, axis: &str) -> CaseResult<Version> {
        Ok(self.value(axis)?.parse::<Version>()?)
    }

    pub fn handle(&self, service: &str) -> CaseResult<HandleId> {
        Ok(self.controller.lookup(service)?)
    }

    /// Start a service (no-op if it is already ready)
    pub async fn start(&mut self, service: &str) -> CaseResult<ReadySignal> {
        let id = self.handle(service)?;
        Ok(self.controller.start(id).await?)
    }

    /// Run a directly invoked application to completion
    pub async fn run(&mut self, service: &str) -> CaseResult<AppOutcome> {
        let id = self.handle(service)?;
        Ok(self.controller.run(id).await?)
    }

    /// Run an application; its failure fails the case
    pub async fn run_expecting_pass(&mut self, service: &str) -> CaseResult<()> {
        match self.run(service).await? {
            AppOutcome::Passed => Ok(()),
            AppOutcome::Failed(reason) => Err(CaseError::Assertion(format!("{}: {}", service, reason))),
            AppOutcome::Exception(info) => {
                Err(CaseError::Application(format!("{}: {}", service, info)))
            }
        }
    }

    /// Stop a service ahead of teardown
    ///
    /// Stop problems are warnings and never fail the case.
    pub async fn stop(&mut self, service: &str) -> CaseResult<()> {
        let id = self.handle(service)?;
        if let Some(warning) = self.controller.stop(id).await {
            self.warnings.push(warning);
        }
        Ok(())
    }

    pub fn endpoint(&self, service: &str) -> CaseResult<Endpoint> {
        Ok(self.controller.resolve_endpoint(self.handle(service)?)?)
    }

    pub fn endpoints(&self, service: &str) -> CaseResult<Vec<Endpoint>> {
        Ok(self.controller.resolve_endpoints(self.handle(service)?)?)
    }

    /// Fail the case with `message` unless `condition` holds
    pub fn ensure(&self, condition: bool, message: impl Into<String>) -> CaseResult<()> {
        if condition {
            Ok(())
        } else {
            Err(CaseError::Assertion(message.into()))
        }
    }

    pub fn controller(&mut self) -> &mut LifecycleController {
        &mut *self.controller
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<TeardownWarning> {
        std::mem::take(&mut self.warnings)
    }
}
