//! Test declarations

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::context::CaseContext;
use super::error::CaseResult;
use crate::lifecycle::ServiceDescriptor;
use crate::matrix::{Matrix, TestCase};

/// Builds the service descriptors for one case from its axis values
pub trait CaseTemplate: Send + Sync {
    fn descriptors(&self, case: &TestCase) -> CaseResult<Vec<ServiceDescriptor>>;
}

impl<F> CaseTemplate for F
where
    F: Fn(&TestCase) -> CaseResult<Vec<ServiceDescriptor>> + Send + Sync,
{
    fn descriptors(&self, case: &TestCase) -> CaseResult<Vec<ServiceDescriptor>> {
        self(case)
    }
}

/// The test itself, run after pre-started services are ready
#[async_trait]
pub trait TestBody: Send + Sync {
    async fn run(&self, ctx: &mut CaseContext<'_>) -> CaseResult<()>;
}

/// A registered test: matrix, cluster size, template and body
#[derive(Clone)]
pub struct TestDefinition {
    pub name: String,
    pub matrix: Matrix,
    /// Nodes one case may use in total
    pub num_nodes: Option<usize>,
    /// Overrides the harness case timeout
    pub timeout: Option<Duration>,
    pub template: Arc<dyn CaseTemplate>,
    pub body: Arc<dyn TestBody>,
}

impl TestDefinition {
    pub fn new<T, B>(name: impl Into<String>, matrix: Matrix, template: T, body: B) -> Self
    where
        T: CaseTemplate + 'static,
        B: TestBody + 'static,
    {
        Self {
            name: name.into(),
            matrix,
            num_nodes: None,
            timeout: None,
            template: Arc::new(template),
            body: Arc::new(body),
        }
    }

    /// Declare the cluster size
    pub fn with_num_nodes(mut self, num_nodes: usize) -> Self {
        self.num_nodes = Some(num_nodes);
        self
    }

    /// Set a per-case timeout for this test
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Number of cases the matrix expands to
    pub fn case_count(&self) -> Option<usize> {
        self.matrix.case_count()
    }
}

impl fmt::Debug for TestDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDefinition")
            .field("name", &self.name)
            .field("matrix", &self.matrix)
            .field("num_nodes", &self.num_nodes)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
