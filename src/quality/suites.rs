//! # Rule Suites
//!
//! Declarative expectation suites for the destination tables. These are data
//! artifacts consumed by an external validation engine; nothing here evaluates
//! them. The JSON shape (`expectation_suite_name`, `expectations[]` with
//! `expectation_type`, `kwargs`, `meta`) is what that engine reads.

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::{DestinationTable, LifecycleState};
use crate::error::{IdentifierError, SuiteExportError};

/// Bumped whenever an expectation is added, removed or changed
pub const SUITE_VERSION: &str = "1.0.0";

/// One rule over one or two columns
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    NotNull {
        column: &'static str,
    },
    InSet {
        column: &'static str,
        values: Vec<String>,
    },
    Between {
        column: &'static str,
        min_value: Option<f64>,
        max_value: Option<f64>,
    },
    /// `column_a > column_b`, or `>=` when `or_equal`
    PairGreaterThan {
        column_a: &'static str,
        column_b: &'static str,
        or_equal: bool,
    },
}

impl Expectation {
    pub fn expectation_type(&self) -> &'static str {
        match self {
            Self::NotNull { .. } => "expect_column_values_to_not_be_null",
            Self::InSet { .. } => "expect_column_values_to_be_in_set",
            Self::Between { .. } => "expect_column_values_to_be_between",
            Self::PairGreaterThan { .. } => "expect_column_pair_values_A_to_be_greater_than_B",
        }
    }

    pub fn columns(&self) -> Vec<&'static str> {
        match self {
            Self::NotNull { column } | Self::InSet { column, .. } | Self::Between { column, .. } => {
                vec![*column]
            }
            Self::PairGreaterThan {
                column_a, column_b, ..
            } => vec![*column_a, *column_b],
        }
    }

    fn kwargs(&self, mostly: f64) -> Map<String, JsonValue> {
        let mut kwargs = Map::new();
        match self {
            Self::NotNull { column } => {
                kwargs.insert("column".into(), json!(column));
            }
            Self::InSet { column, values } => {
                kwargs.insert("column".into(), json!(column));
                kwargs.insert("value_set".into(), json!(values));
            }
            Self::Between {
                column,
                min_value,
                max_value,
            } => {
                kwargs.insert("column".into(), json!(column));
                if let Some(min) = min_value {
                    kwargs.insert("min_value".into(), json!(min));
                }
                if let Some(max) = max_value {
                    kwargs.insert("max_value".into(), json!(max));
                }
            }
            Self::PairGreaterThan {
                column_a,
                column_b,
                or_equal,
            } => {
                kwargs.insert("column_A".into(), json!(column_a));
                kwargs.insert("column_B".into(), json!(column_b));
                kwargs.insert("or_equal".into(), json!(or_equal));
            }
        }
        kwargs.insert("mostly".into(), json!(mostly));
        kwargs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub expectation: Expectation,
    /// Fraction of rows that must satisfy the rule
    pub mostly: f64,
    /// Markdown note shown by the validation engine
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationSuite {
    pub name: String,
    pub table: DestinationTable,
    pub rules: Vec<Rule>,
}

/// Serialized form of one rule
#[derive(Debug, Serialize)]
pub struct ExpectationConfiguration {
    pub expectation_type: &'static str,
    pub kwargs: Map<String, JsonValue>,
    pub meta: JsonValue,
}

/// Serialized form of a suite
#[derive(Debug, Serialize)]
pub struct SuiteDocument {
    pub expectation_suite_name: String,
    pub data_asset_name: String,
    pub version: &'static str,
    pub expectations: Vec<ExpectationConfiguration>,
}

impl ExpectationSuite {
    pub fn new(table: DestinationTable) -> Self {
        Self {
            name: format!("{table}_suite"),
            table,
            rules: Vec::new(),
        }
    }

    /// Append a rule that must hold for every row
    pub fn expect(mut self, expectation: Expectation, note: impl Into<String>) -> Self {
        self.rules.push(Rule {
            expectation,
            mostly: 1.0,
            note: note.into(),
        });
        self
    }

    /// Every referenced column must be in the table's allow-list
    pub fn validate(&self) -> Result<(), IdentifierError> {
        for rule in &self.rules {
            for column in rule.expectation.columns() {
                self.table.column(column)?;
            }
        }
        Ok(())
    }

    pub fn to_document(&self) -> SuiteDocument {
        SuiteDocument {
            expectation_suite_name: self.name.clone(),
            data_asset_name: self.table.name().to_string(),
            version: SUITE_VERSION,
            expectations: self
                .rules
                .iter()
                .map(|rule| ExpectationConfiguration {
                    expectation_type: rule.expectation.expectation_type(),
                    kwargs: rule.expectation.kwargs(rule.mostly),
                    meta: json!({
                        "notes": {
                            "format": "markdown",
                            "content": rule.note,
                        }
                    }),
                })
                .collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, SuiteExportError> {
        self.validate()?;
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }
}

fn state_values(include_task_only: bool) -> Vec<String> {
    LifecycleState::ALL
        .iter()
        .filter(|state| include_task_only || state.is_run_state())
        .map(|state| state.as_str().to_string())
        .collect()
}

fn end_after_start() -> Expectation {
    Expectation::PairGreaterThan {
        column_a: "end_date",
        column_b: "start_date",
        or_equal: true,
    }
}

/// Rules for `dag_runs`. Runs carry no duration column, so there is no range
/// rule on it.
pub fn dag_runs_suite() -> ExpectationSuite {
    ExpectationSuite::new(DestinationTable::DagRuns)
        .expect(
            Expectation::NotNull { column: "dag_id" },
            "dag_id is a required field and must not be null",
        )
        .expect(
            Expectation::NotNull {
                column: "execution_date",
            },
            "execution_date is required for tracking when DAGs run",
        )
        .expect(
            Expectation::InSet {
                column: "state",
                values: state_values(false),
            },
            "state must be one of the valid Airflow DAG run states",
        )
        .expect(
            end_after_start(),
            "end_date should be after or equal to start_date",
        )
}

pub fn task_instances_suite() -> ExpectationSuite {
    ExpectationSuite::new(DestinationTable::TaskInstances)
        .expect(
            Expectation::NotNull { column: "dag_id" },
            "dag_id is a required field and must not be null",
        )
        .expect(
            Expectation::NotNull { column: "task_id" },
            "task_id is a required field and must not be null",
        )
        .expect(
            Expectation::NotNull {
                column: "execution_date",
            },
            "execution_date is required for tracking when tasks run",
        )
        .expect(
            Expectation::InSet {
                column: "state",
                values: state_values(true),
            },
            "state must be one of the valid Airflow task instance states",
        )
        .expect(
            Expectation::Between {
                column: "duration",
                min_value: Some(0.0),
                max_value: None,
            },
            "duration (in seconds) must be non-negative when present",
        )
        .expect(
            Expectation::Between {
                column: "try_number",
                min_value: Some(1.0),
                max_value: None,
            },
            "try_number must be at least 1 (first attempt)",
        )
        .expect(
            end_after_start(),
            "end_date should be after or equal to start_date",
        )
}

pub fn all_suites() -> Vec<ExpectationSuite> {
    vec![dag_runs_suite(), task_instances_suite()]
}

/// Write every suite to `<dir>/<suite_name>.json`, creating `dir` if needed
pub fn export_suites(dir: &Path) -> Result<Vec<PathBuf>, SuiteExportError> {
    std::fs::create_dir_all(dir).map_err(|source| SuiteExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for suite in all_suites() {
        let path = dir.join(format!("{}.json", suite.name));
        let body = suite.to_json_pretty()?;
        std::fs::write(&path, body).map_err(|source| SuiteExportError::Io {
            path: path.clone(),
            source,
        })?;
        info!(suite = %suite.name, path = %path.display(), "Exported expectation suite");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_suite_column_is_allow_listed() {
        for suite in all_suites() {
            assert!(suite.validate().is_ok(), "{} references unknown columns", suite.name);
        }
    }

    #[test]
    fn run_states_exclude_task_only_states() {
        let suite = dag_runs_suite();
        let states = suite
            .rules
            .iter()
            .find_map(|rule| match &rule.expectation {
                Expectation::InSet { values, .. } => Some(values.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(states.len(), 10);
        assert!(!states.contains(&"removed".to_string()));
        assert!(states.contains(&"none".to_string()));
    }

    #[test]
    fn task_suite_covers_ranges_and_ordering() {
        let suite = task_instances_suite();
        assert_eq!(suite.name, "task_instances_suite");
        assert_eq!(suite.rules.len(), 7);
        assert!(suite.rules.iter().all(|rule| rule.mostly == 1.0));
        assert!(suite.rules.iter().any(|rule| matches!(
            rule.expectation,
            Expectation::Between {
                column: "try_number",
                min_value: Some(min),
                ..
            } if min == 1.0
        )));
    }

    #[test]
    fn document_shape_matches_engine_format() {
        let doc = serde_json::to_value(task_instances_suite().to_document()).unwrap();
        assert_eq!(doc["expectation_suite_name"], "task_instances_suite");
        assert_eq!(doc["data_asset_name"], "task_instances");
        assert_eq!(doc["version"], SUITE_VERSION);

        let pair = doc["expectations"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["expectation_type"] == "expect_column_pair_values_A_to_be_greater_than_B")
            .unwrap();
        assert_eq!(pair["kwargs"]["column_A"], "end_date");
        assert_eq!(pair["kwargs"]["or_equal"], true);
        assert_eq!(pair["kwargs"]["mostly"], 1.0);
        assert_eq!(pair["meta"]["notes"]["format"], "markdown");
    }

    #[test]
    fn unknown_column_fails_validation() {
        let suite = ExpectationSuite::new(DestinationTable::DagRuns)
            .expect(Expectation::NotNull { column: "duration" }, "not a run column");
        assert!(suite.validate().is_err());
        assert!(matches!(
            suite.to_json_pretty(),
            Err(SuiteExportError::Identifier(_))
        ));
    }

    #[test]
    fn export_writes_one_file_per_suite() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_suites(&dir.path().join("suites")).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("dag_runs_suite.json"));

        let body = std::fs::read_to_string(&written[1]).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(doc["expectations"].as_array().unwrap().len(), 7);
    }
}
