//! Date-window parameter templating.
//!
//! Saved workflows carry a parameter object whose string values may contain
//! date placeholders. Rendering a template for a [`DateWindow`] replaces the
//! placeholders below and leaves everything else untouched:
//!
//! | Placeholder | Rendered as |
//! |-------------|-------------|
//! | `{{start_date}}` | `2024-01-01` |
//! | `{{end_date}}` | `2024-01-07` |
//! | `{{start_datetime}}` | `2024-01-01T00:00:00` |
//! | `{{end_datetime}}` | `2024-01-07T23:59:59` |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Create a window. Returns `None` if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    fn replacements(&self) -> [(&'static str, String); 4] {
        [
            ("{{start_date}}", self.start.format("%Y-%m-%d").to_string()),
            ("{{end_date}}", self.end.format("%Y-%m-%d").to_string()),
            (
                "{{start_datetime}}",
                self.start.format("%Y-%m-%dT00:00:00").to_string(),
            ),
            (
                "{{end_datetime}}",
                self.end.format("%Y-%m-%dT23:59:59").to_string(),
            ),
        ]
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// A workflow parameter object with date placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterTemplate(pub Map<String, Value>);

impl ParameterTemplate {
    /// Wrap an existing parameter map.
    pub fn new(params: Map<String, Value>) -> Self {
        Self(params)
    }

    /// Build a template from a JSON value. Non-object values yield an empty template.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Render the template for one date window.
    pub fn render(&self, window: &DateWindow) -> Map<String, Value> {
        let replacements = window.replacements();
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), substitute(v, &replacements)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn substitute(value: &Value, replacements: &[(&'static str, String)]) -> Value {
    match value {
        Value::String(s) => {
            let mut out = s.clone();
            for (placeholder, rendered) in replacements {
                if out.contains(placeholder) {
                    out = out.replace(placeholder, rendered);
                }
            }
            Value::String(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, replacements))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, replacements)))
                .collect(),
        ),
        other => other.clone(),
    }
}
