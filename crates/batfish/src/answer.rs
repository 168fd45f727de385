//! Answer envelopes and table materialization.
//!
//! Every answer arrives as one JSON envelope. Payloads that declare column
//! metadata materialize into a [`TableAnswer`] with one typed [`Row`] per
//! result; everything else stays a [`GenericAnswer`] wrapping the raw value.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::{convert_for_question, SchemaValue};

static NULL_CELL: SchemaValue = SchemaValue::Null;

/// A deserialized backend answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Table(TableAnswer),
    Generic(GenericAnswer),
}

impl Answer {
    /// Parses a raw answer payload, building a table when the payload
    /// declares column metadata.
    pub fn parse(value: Value) -> Result<Answer> {
        let is_table = value
            .get("answerElements")
            .and_then(Value::as_array)
            .and_then(|elements| elements.first())
            .map(|element| element.get("metadata").is_some())
            .unwrap_or(false);
        if is_table {
            TableAnswer::new(value).map(Answer::Table)
        } else {
            Ok(Answer::Generic(GenericAnswer { raw: value }))
        }
    }

    /// The originating question's instance name, if the envelope carries
    /// one. Never fails.
    pub fn question_name(&self) -> Option<&str> {
        question_name(self.raw())
    }

    /// Envelope status string, if present.
    pub fn status(&self) -> Option<&str> {
        self.raw().get("status").and_then(Value::as_str)
    }

    /// Result count from the envelope summary, if present.
    pub fn num_results(&self) -> Option<u64> {
        self.raw()
            .get("summary")
            .and_then(|s| s.get("numResults"))
            .and_then(Value::as_u64)
    }

    pub fn raw(&self) -> &Value {
        match self {
            Answer::Table(table) => &table.raw,
            Answer::Generic(generic) => &generic.raw,
        }
    }

    pub fn as_table(&self) -> Option<&TableAnswer> {
        match self {
            Answer::Table(table) => Some(table),
            Answer::Generic(_) => None,
        }
    }
}

fn question_name(raw: &Value) -> Option<&str> {
    raw.get("question")
        .and_then(|q| q.get("instance"))
        .and_then(|i| i.get("instanceName"))
        .and_then(Value::as_str)
}

/// A non-tabular answer; callers consume the raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericAnswer {
    pub raw: Value,
}

/// Declared metadata for one table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub schema: String,
    pub description: Option<String>,
    pub is_key: bool,
    pub is_value: bool,
}

impl ColumnMetadata {
    fn parse(value: &Value) -> Result<ColumnMetadata> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Deserialization(format!("column metadata is missing name: {}", value))
            })?
            .to_string();
        let schema = value
            .get("schema")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Deserialization(format!("column metadata is missing schema: {}", value))
            })?
            .to_string();
        Ok(ColumnMetadata {
            name,
            schema,
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            is_key: value.get("isKey").and_then(Value::as_bool).unwrap_or(true),
            is_value: value.get("isValue").and_then(Value::as_bool).unwrap_or(true),
        })
    }
}

/// One materialized table row.
///
/// Declared columns hold values converted through the schema registry; any
/// extra key the backend sent is kept as raw passthrough rather than
/// dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: HashMap<String, SchemaValue>,
}

impl Row {
    fn materialize(
        columns: &[ColumnMetadata],
        raw: &Value,
        question: Option<&str>,
    ) -> Result<Row> {
        let mut cells = HashMap::new();
        for column in columns {
            let value = raw.get(&column.name).unwrap_or(&Value::Null);
            cells.insert(
                column.name.clone(),
                convert_for_question(&column.schema, value, question)?,
            );
        }
        if let Some(map) = raw.as_object() {
            for (key, value) in map {
                if !cells.contains_key(key) {
                    cells.insert(key.clone(), SchemaValue::Json(value.clone()));
                }
            }
        }
        Ok(Row { cells })
    }

    pub fn get(&self, column: &str) -> Option<&SchemaValue> {
        self.cells.get(column)
    }

    /// Number of cells, declared and passthrough.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// An answer with declared column metadata and materialized rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableAnswer {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Row>,
    raw: Value,
}

impl TableAnswer {
    /// Builds a table from a raw answer envelope.
    ///
    /// The first answer element must carry `metadata.columnMetadata`; each
    /// declared column must name both `name` and `schema`.
    pub fn new(value: Value) -> Result<TableAnswer> {
        let question = question_name(&value).map(String::from);
        let element = value
            .get("answerElements")
            .and_then(Value::as_array)
            .and_then(|elements| elements.first())
            .ok_or_else(|| {
                Error::Deserialization("answer has no answer elements".to_string())
            })?;
        let metadata = element.get("metadata").ok_or_else(|| {
            Error::Deserialization("table answer element is missing metadata".to_string())
        })?;
        let raw_columns = metadata
            .get("columnMetadata")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::Deserialization("table metadata is missing columnMetadata".to_string())
            })?;
        let columns = raw_columns
            .iter()
            .map(ColumnMetadata::parse)
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::new();
        if let Some(raw_rows) = element.get("rows").and_then(Value::as_array) {
            for raw_row in raw_rows {
                rows.push(Row::materialize(&columns, raw_row, question.as_deref())?);
            }
        }
        Ok(TableAnswer { columns, rows, raw: value })
    }

    /// Declared column names, in declared order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows as records: one entry per row, cells in declared column order.
    pub fn records(&self) -> Vec<Vec<&SchemaValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| row.get(&c.name).unwrap_or(&NULL_CELL))
                    .collect()
            })
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table_envelope(rows: Value) -> Value {
        json!({
            "answerElements": [{
                "metadata": {
                    "columnMetadata": [
                        {"name": "Node", "schema": "Node"},
                        {"name": "Count", "schema": "Integer", "isKey": false}
                    ]
                },
                "rows": rows
            }],
            "status": "SUCCESS",
            "summary": {"numResults": 1},
            "question": {"instance": {"instanceName": "nodeCount"}}
        })
    }

    #[test]
    fn test_empty_table_has_declared_columns() {
        let envelope = json!({
            "answerElements": [{
                "metadata": {"columnMetadata": [{"name": "Column", "schema": "String"}]},
                "rows": []
            }]
        });
        let table = TableAnswer::new(envelope).unwrap();
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.column_names(), vec!["Column"]);
        assert!(table.records().is_empty());
    }

    #[test]
    fn test_rows_materialize_through_registry() {
        let envelope = table_envelope(json!([
            {"Node": {"name": "r1"}, "Count": 3}
        ]));
        let table = TableAnswer::new(envelope).unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(
            table.rows[0].get("Node"),
            Some(&SchemaValue::Str("r1".into()))
        );
        assert_eq!(table.rows[0].get("Count"), Some(&SchemaValue::Int(3)));
    }

    #[test]
    fn test_missing_row_entry_is_null() {
        let envelope = table_envelope(json!([{"Node": {"name": "r1"}}]));
        let table = TableAnswer::new(envelope).unwrap();
        assert_eq!(table.rows[0].get("Count"), Some(&SchemaValue::Null));
    }

    #[test]
    fn test_extra_row_keys_are_preserved() {
        let envelope = table_envelope(json!([
            {"Node": {"name": "r1"}, "Count": 3, "Debug": "extra"}
        ]));
        let table = TableAnswer::new(envelope).unwrap();
        assert_eq!(
            table.rows[0].get("Debug"),
            Some(&SchemaValue::Json(json!("extra")))
        );
        // records stay limited to declared columns, in declared order
        assert_eq!(table.records()[0].len(), 2);
    }

    #[test]
    fn test_missing_metadata_is_error() {
        let envelope = json!({"answerElements": [{"rows": []}]});
        // not detected as a table; forcing table construction fails
        let err = TableAnswer::new(envelope).unwrap_err();
        assert!(err.to_string().contains("metadata"));
    }

    #[test]
    fn test_column_without_schema_is_error() {
        let envelope = json!({
            "answerElements": [{
                "metadata": {"columnMetadata": [{"name": "Column"}]}
            }]
        });
        let err = TableAnswer::new(envelope).unwrap_err();
        assert!(err.to_string().contains("schema"));
    }

    #[test]
    fn test_parse_dispatches_on_metadata() {
        let table = Answer::parse(table_envelope(json!([]))).unwrap();
        assert!(table.as_table().is_some());

        let generic = Answer::parse(json!({"answerElements": [{"answer": "42"}]})).unwrap();
        assert!(generic.as_table().is_none());
    }

    #[test]
    fn test_question_name_never_raises() {
        let answer = Answer::parse(table_envelope(json!([]))).unwrap();
        assert_eq!(answer.question_name(), Some("nodeCount"));

        let anonymous = Answer::parse(json!({})).unwrap();
        assert_eq!(anonymous.question_name(), None);
        assert_eq!(anonymous.num_results(), None);
    }

    #[test]
    fn test_summary_and_status() {
        let answer = Answer::parse(table_envelope(json!([{"Node": {"name": "r1"}}]))).unwrap();
        assert_eq!(answer.status(), Some("SUCCESS"));
        assert_eq!(answer.num_results(), Some(1));
    }
}
