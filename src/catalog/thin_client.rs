//! Thin client compatibility test
//!
//! One single-node server with a client connector, one thin client
//! application connecting to it. Every pairing of `dev` and `latest` on both
//! sides must interoperate.

use async_trait::async_trait;

use crate::executor::{CaseContext, CaseResult, TestBody, TestDefinition};
use crate::lifecycle::ServiceDescriptor;
use crate::matrix::{Matrix, MatrixResult, TestCase};
use crate::version::{Version, DEV_BRANCH, LATEST};

pub const TEST_NAME: &str = "thin_client_compatibility";

pub const SERVER_VERSION_AXIS: &str = "server_version";
pub const THIN_CLIENT_VERSION_AXIS: &str = "thin_client_version";

/// Parameter carrying the server's `host:port` to the client application
pub const THIN_CLIENT_CONNECTION_PARAM: &str = crate::lifecycle::CONNECTION_PARAM;

pub const THIN_CLIENT_ENTRY_POINT: &str =
    "org.apache.ignite.internal.ducktest.tests.thin_client_test.ThinClientSelfTestApplication";

pub const SERVER_SERVICE: &str = "ignite";
pub const CLIENT_SERVICE: &str = "thin-client";

/// Cluster size declared for each case
pub const NUM_NODES: usize = 2;

/// `server_version` x `thin_client_version`, both over `dev` and `latest`
pub fn matrix() -> MatrixResult<Matrix> {
    Matrix::new()
        .axis(SERVER_VERSION_AXIS, [DEV_BRANCH, LATEST])?
        .axis(THIN_CLIENT_VERSION_AXIS, [DEV_BRANCH, LATEST])
}

/// Server plus a directly invoked client wired to its endpoint
pub fn descriptors(case: &TestCase) -> CaseResult<Vec<ServiceDescriptor>> {
    let server_version: Version = case.require(SERVER_VERSION_AXIS)?.parse()?;
    let client_version: Version = case.require(THIN_CLIENT_VERSION_AXIS)?.parse()?;

    Ok(vec![
        ServiceDescriptor::server(SERVER_SERVICE, server_version),
        ServiceDescriptor::client_application(CLIENT_SERVICE, client_version, THIN_CLIENT_ENTRY_POINT)
            .with_endpoint_param(THIN_CLIENT_CONNECTION_PARAM, SERVER_SERVICE),
    ])
}

/// Start the server, run the thin client against it, stop the server
pub struct ThinClientBody;

#[async_trait]
impl TestBody for ThinClientBody {
    async fn run(&self, ctx: &mut CaseContext<'_>) -> CaseResult<()> {
        let ready = ctx.start(SERVER_SERVICE).await?;
        tracing::debug!(endpoints = ?ready.endpoints, "Server ready for thin client");
        ctx.run_expecting_pass(CLIENT_SERVICE).await?;
        ctx.stop(SERVER_SERVICE).await
    }
}

pub fn definition() -> MatrixResult<TestDefinition> {
    Ok(TestDefinition::new(TEST_NAME, matrix()?, descriptors, ThinClientBody).with_num_nodes(NUM_NODES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ParamValue, ServiceRole, StartupMode};

    #[test]
    fn test_matrix_has_four_cases() {
        let cases: Vec<String> = matrix().unwrap().expand().map(|c| c.id()).collect();
        assert_eq!(
            cases,
            vec![
                "server_version=dev.thin_client_version=dev",
                "server_version=dev.thin_client_version=latest",
                "server_version=latest.thin_client_version=dev",
                "server_version=latest.thin_client_version=latest",
            ]
        );
    }

    #[test]
    fn test_descriptors_follow_axes() {
        let case = matrix().unwrap().expand().nth(2).unwrap();
        let descriptors = descriptors(&case).unwrap();
        assert_eq!(descriptors.len(), 2);

        let server = &descriptors[0];
        assert_eq!(server.role, ServiceRole::Server);
        assert_eq!(server.version, Version::Latest);
        assert!(server.client_connector.is_some());

        let client = &descriptors[1];
        assert_eq!(client.version, Version::Dev);
        assert_eq!(client.startup_mode, StartupMode::InvokedDirectly);
        assert_eq!(client.entry_point.as_deref(), Some(THIN_CLIENT_ENTRY_POINT));
        assert_eq!(
            client.params.get(THIN_CLIENT_CONNECTION_PARAM),
            Some(&ParamValue::EndpointOf(SERVER_SERVICE.to_string()))
        );

        let total: usize = descriptors.iter().map(|d| d.node_count).sum();
        assert_eq!(total, NUM_NODES);
    }

    #[test]
    fn test_definition() {
        let def = definition().unwrap();
        assert_eq!(def.name, TEST_NAME);
        assert_eq!(def.num_nodes, Some(2));
        assert_eq!(def.case_count(), Some(4));
    }
}
