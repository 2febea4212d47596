//! Test configuration for a single stream (variable).

use super::registry::{TestKind, TestParams};
use crate::error::{QcError, Result};
use serde_json::{Map, Value};

/// One variable bound to an ordered list of configured tests
///
/// Source form: `{module: {test: params}}`. Tests are kept grouped by module
/// in first-seen order, each test at most once, matching the source form.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    stream_id: String,
    tests: Vec<TestParams>,
}

impl StreamConfig {
    /// Bind tests to a stream; a repeated test replaces the earlier one in place
    pub fn new(stream_id: impl Into<String>, tests: Vec<TestParams>) -> Self {
        let mut groups: Vec<(&'static str, Vec<TestParams>)> = Vec::new();
        for params in tests {
            let kind = params.kind();
            let position = match groups.iter().position(|(module, _)| *module == kind.module()) {
                Some(position) => position,
                None => {
                    groups.push((kind.module(), Vec::new()));
                    groups.len() - 1
                }
            };
            let group = &mut groups[position].1;
            match group.iter_mut().find(|existing| existing.kind() == kind) {
                Some(existing) => *existing = params,
                None => group.push(params),
            }
        }

        Self {
            stream_id: stream_id.into(),
            tests: groups.into_iter().flat_map(|(_, tests)| tests).collect(),
        }
    }

    pub fn from_value(stream_id: &str, value: &Value) -> Result<Self> {
        let modules = value.as_object().ok_or_else(|| {
            QcError::configuration(stream_id, "expected a mapping of module -> test -> parameters")
        })?;

        let mut tests = Vec::new();
        for (module, module_tests) in modules {
            let at = format!("{}.{}", stream_id, module);
            let module_tests = module_tests
                .as_object()
                .ok_or_else(|| {
                    QcError::configuration(&at, "expected a mapping of test -> parameters")
                })?;
            for (test, params) in module_tests {
                let kind = TestKind::from_path(module, test)?;
                tests.push(kind.parse_params(params, &format!("{}.{}", at, test))?);
            }
        }
        Ok(Self::new(stream_id, tests))
    }

    pub fn to_value(&self) -> Result<Value> {
        let mut modules = Map::new();
        for params in &self.tests {
            let kind = params.kind();
            let entry = modules
                .entry(kind.module())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(tests) = entry {
                tests.insert(kind.name().to_string(), params.to_value()?);
            }
        }
        Ok(Value::Object(modules))
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn tests(&self) -> &[TestParams] {
        &self.tests
    }

    /// Configured tests other than `aggregate`, in configuration order
    pub fn evaluated_tests(&self) -> impl Iterator<Item = &TestParams> {
        self.tests.iter().filter(|p| !p.kind().is_aggregate())
    }

    pub fn has_aggregate(&self) -> bool {
        self.tests.iter().any(|p| p.kind().is_aggregate())
    }
}
