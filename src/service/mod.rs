//! Concrete service collaborators
//!
//! - [`loopback`]: in-process TCP servers and clients, used by default and in tests
//! - [`process`]: servers and applications as child processes

pub mod loopback;
pub mod process;

pub use loopback::{CompatibilityCheck, LoopbackLauncher};
pub use process::{CommandTemplate, ProcessLauncher, ProcessLauncherConfig, TemplateError};
