//! Command line templates
//!
//! Placeholders are substituted per node before spawning:
//! `{version}`, `{port}`, `{node}`, `{host}`, `{entry_point}`, `{work_dir}`.
//! Unknown placeholders are left as-is.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command line that cannot become a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("empty command line")]
    Empty,

    #[error("cannot split command line: {0}")]
    Unbalanced(String),
}

/// Program and arguments with placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

/// Values substituted into a [`CommandTemplate`]
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub version: &'a str,
    pub port: Option<u16>,
    pub node: usize,
    pub host: &'a str,
    pub entry_point: Option<&'a str>,
    pub work_dir: Option<&'a Path>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a command line with POSIX shell quoting rules
    ///
    /// `sh -c 'sleep 30'` yields the arguments `-c` and `sleep 30`.
    pub fn parse(line: &str) -> Result<Self, TemplateError> {
        let words = shell_words::split(line).map_err(|e| TemplateError::Unbalanced(e.to_string()))?;
        let mut words = words.into_iter();
        let program = words.next().ok_or(TemplateError::Empty)?;
        Ok(Self::new(program, words))
    }

    /// Substitute placeholders, returning program and arguments
    pub fn render(&self, vars: &TemplateVars<'_>) -> (String, Vec<String>) {
        let program = substitute(&self.program, vars);
        let args = self.args.iter().map(|a| substitute(a, vars)).collect();
        (program, args)
    }
}

fn substitute(input: &str, vars: &TemplateVars<'_>) -> String {
    let mut out = input.replace("{version}", vars.version);
    out = out.replace("{node}", &vars.node.to_string());
    out = out.replace("{host}", vars.host);
    if let Some(port) = vars.port {
        out = out.replace("{port}", &port.to_string());
    }
    if let Some(entry_point) = vars.entry_point {
        out = out.replace("{entry_point}", entry_point);
    }
    if let Some(work_dir) = vars.work_dir {
        out = out.replace("{work_dir}", &work_dir.to_string_lossy());
    }
    out
}
