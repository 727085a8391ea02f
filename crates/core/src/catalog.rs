//! Turns a test selection into concrete [`ModuleSpec`]s.
//!
//! Every module runs the same driver command template; only the `{script}`
//! placeholder differs. The first module of the selection is the one that
//! asks for a clean results area.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::module::ModuleSpec;

/// Replaced with the module's test script path.
pub const SCRIPT_PLACEHOLDER: &str = "{script}";

/// One requested module: a display name and the script it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSelection {
    pub name: String,
    pub path: String,
}

impl ModuleSelection {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// The configured driver command plus the default module list.
#[derive(Debug, Clone)]
pub struct ModuleCatalog {
    template: Vec<String>,
    defaults: Vec<ModuleSelection>,
}

impl ModuleCatalog {
    pub fn new(template: Vec<String>, defaults: Vec<ModuleSelection>) -> Result<Self, CoreError> {
        if !matches!(template.first(), Some(program) if !program.trim().is_empty()) {
            return Err(CoreError::Validation(
                "module command template is empty".to_string(),
            ));
        }
        Ok(Self { template, defaults })
    }

    /// Build specs for `selection`, or for the default list when the
    /// selection is absent or empty.
    pub fn specs(&self, selection: Option<&[ModuleSelection]>) -> Result<Vec<ModuleSpec>, CoreError> {
        let selection = match selection {
            Some(list) if !list.is_empty() => list,
            _ => &self.defaults,
        };

        selection
            .iter()
            .enumerate()
            .map(|(index, item)| self.spec(item, index == 0))
            .collect()
    }

    fn spec(&self, item: &ModuleSelection, first: bool) -> Result<ModuleSpec, CoreError> {
        if item.path.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "module '{}' has no test script",
                item.name
            )));
        }
        let command = self
            .template
            .iter()
            .map(|arg| arg.replace(SCRIPT_PLACEHOLDER, &item.path))
            .collect();

        Ok(ModuleSpec::new(item.name.clone(), command)?
            .with_script(PathBuf::from(&item.path))
            .with_clean_slate(first))
    }
}

/// Split a command line on whitespace. No quoting is supported.
pub fn parse_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Parse `Name=path,Name=path` into a module list.
pub fn parse_modules(raw: &str) -> Result<Vec<ModuleSelection>, CoreError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, path) = entry.split_once('=').ok_or_else(|| {
                CoreError::Validation(format!("module entry '{entry}' must be Name=path"))
            })?;
            let (name, path) = (name.trim(), path.trim());
            if name.is_empty() || path.is_empty() {
                return Err(CoreError::Validation(format!(
                    "module entry '{entry}' must be Name=path"
                )));
            }
            Ok(ModuleSelection::new(name, path))
        })
        .collect()
}
