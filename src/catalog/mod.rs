//! Process-wide test catalog
//!
//! Tests are collected into a [`CatalogBuilder`] and installed exactly once;
//! after that the catalog is read-only. Nothing registers itself implicitly:
//! [`init`] is the explicit initialization phase that installs the built-in
//! tests.

pub mod thin_client;

use std::sync::OnceLock;

use thiserror::Error;

use crate::executor::TestDefinition;
use crate::matrix::MatrixError;

static CATALOG: OnceLock<TestCatalog> = OnceLock::new();

/// Catalog registration and lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("test catalog is already initialized")]
    AlreadyInitialized,

    #[error("test catalog is not initialized")]
    NotInitialized,

    #[error("duplicate test: {0}")]
    DuplicateTest(String),

    #[error("unknown test: {0}")]
    UnknownTest(String),

    /// A built-in test failed to declare its matrix
    #[error("invalid test declaration: {0}")]
    Declaration(#[from] MatrixError),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Collects test definitions before installation
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    tests: Vec<TestDefinition>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a test; names must be unique
    pub fn register(mut self, test: TestDefinition) -> CatalogResult<Self> {
        if self.tests.iter().any(|t| t.name == test.name) {
            return Err(CatalogError::DuplicateTest(test.name));
        }
        self.tests.push(test);
        Ok(self)
    }

    /// Add the tests shipped with the harness
    pub fn with_builtin(self) -> CatalogResult<Self> {
        self.register(thin_client::definition()?)
    }

    pub fn build(self) -> TestCatalog {
        TestCatalog { tests: self.tests }
    }
}

/// Registered tests in registration order
#[derive(Debug)]
pub struct TestCatalog {
    tests: Vec<TestDefinition>,
}

impl TestCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn tests(&self) -> &[TestDefinition] {
        &self.tests
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|t| t.name.as_str())
    }

    pub fn get(&self, name: &str) -> CatalogResult<&TestDefinition> {
        self.tests
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CatalogError::UnknownTest(name.to_string()))
    }

    /// Tests whose name contains `filter`, or all tests without a filter
    pub fn select(&self, filter: Option<&str>) -> Vec<TestDefinition> {
        self.tests
            .iter()
            .filter(|t| filter.map_or(true, |f| t.name.contains(f)))
            .cloned()
            .collect()
    }

    /// Make this the process-wide catalog
    pub fn install(self) -> CatalogResult<&'static TestCatalog> {
        let mut pending = Some(self);
        let installed = CATALOG.get_or_init(|| {
            // Only reached by the first installer
            pending.take().unwrap_or_else(|| TestCatalog { tests: Vec::new() })
        });
        if pending.is_some() {
            return Err(CatalogError::AlreadyInitialized);
        }
        tracing::debug!(tests = installed.tests.len(), "Installed test catalog");
        Ok(installed)
    }

    /// The installed catalog
    pub fn global() -> CatalogResult<&'static TestCatalog> {
        CATALOG.get().ok_or(CatalogError::NotInitialized)
    }
}

/// Install the built-in tests as the process-wide catalog
pub fn init() -> CatalogResult<&'static TestCatalog> {
    CatalogBuilder::new().with_builtin()?.build().install()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration() {
        let def = thin_client::definition().unwrap();
        let err = CatalogBuilder::new()
            .register(def.clone())
            .unwrap()
            .register(def)
            .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateTest(thin_client::TEST_NAME.to_string()));
    }

    #[test]
    fn test_lookup_and_select() {
        let catalog = CatalogBuilder::new().with_builtin().unwrap().build();
        assert!(catalog.get(thin_client::TEST_NAME).is_ok());
        assert_eq!(
            catalog.get("nope").unwrap_err(),
            CatalogError::UnknownTest("nope".to_string())
        );
        assert_eq!(catalog.select(Some("thin")).len(), 1);
        assert!(catalog.select(Some("rebalance")).is_empty());
        assert_eq!(catalog.select(None).len(), 1);
    }

    #[test]
    fn test_install_once() {
        // The only test in this binary that installs
        assert!(init().is_ok());
        assert_eq!(init().unwrap_err(), CatalogError::AlreadyInitialized);
        assert_eq!(TestCatalog::global().unwrap().tests().len(), 1);
    }
}
