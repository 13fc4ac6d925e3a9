//! Test bodies and templates for driving the runner

use std::time::Duration;

use async_trait::async_trait;

use compat_matrix::executor::{CaseContext, CaseError, CaseResult, TestBody};
use compat_matrix::lifecycle::ServiceDescriptor;
use compat_matrix::matrix::TestCase;
use compat_matrix::version::Version;

use super::sim::CASE_PARAM;

/// Axis whose value selects what [`ScriptedBody`] does
pub const MODE_AXIS: &str = "mode";

/// Axis holding the server version for [`single_server`]
pub const VERSION_AXIS: &str = "version";

pub const SERVER: &str = "server";
pub const APP: &str = "app";

/// One pre-started server tagged with its case
pub fn single_server(case: &TestCase) -> CaseResult<Vec<ServiceDescriptor>> {
    let version = match case.get(VERSION_AXIS) {
        Some(v) => v.parse()?,
        None => Version::Dev,
    };
    Ok(vec![
        ServiceDescriptor::server(SERVER, version).with_param(CASE_PARAM, case.id())
    ])
}

/// Server plus an application connected to it
pub fn server_and_app(case: &TestCase) -> CaseResult<Vec<ServiceDescriptor>> {
    Ok(vec![
        ServiceDescriptor::server(SERVER, Version::Dev).with_param(CASE_PARAM, case.id()),
        ServiceDescriptor::client_application(APP, Version::Latest, "Main")
            .with_endpoint_param("connection", SERVER)
            .with_param(CASE_PARAM, case.id()),
    ])
}

/// Does nothing; the pre-started services are all the case needs
pub struct IdleBody;

#[async_trait]
impl TestBody for IdleBody {
    async fn run(&self, _ctx: &mut CaseContext<'_>) -> CaseResult<()> {
        Ok(())
    }
}

/// Runs [`APP`] and expects it to pass
pub struct RunAppBody;

#[async_trait]
impl TestBody for RunAppBody {
    async fn run(&self, ctx: &mut CaseContext<'_>) -> CaseResult<()> {
        ctx.run_expecting_pass(APP).await
    }
}

/// Sleeps, then passes
pub struct SleepBody(pub Duration);

#[async_trait]
impl TestBody for SleepBody {
    async fn run(&self, _ctx: &mut CaseContext<'_>) -> CaseResult<()> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

/// Acts on the case's [`MODE_AXIS`] value:
/// `pass`, `fail`, `hang` or `panic`
pub struct ScriptedBody;

#[async_trait]
impl TestBody for ScriptedBody {
    async fn run(&self, ctx: &mut CaseContext<'_>) -> CaseResult<()> {
        match ctx.value(MODE_AXIS).unwrap_or("pass") {
            "fail" => Err(CaseError::Assertion("scripted failure".to_string())),
            "hang" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            "panic" => panic!("scripted panic"),
            _ => Ok(()),
        }
    }
}
