//! Schema type registry: converts raw answer values into typed cells.
//!
//! Column values arrive as raw JSON tagged with a backend-declared schema
//! string such as `"Flow"`, `"List<Node>"`, or `"SelfDescribing"`. The
//! registry maps those strings to conversions into [`SchemaValue`],
//! recursively for `List<T>`/`Set<T>` wrappers. Unknown schema strings pass
//! through unconverted so newer backends keep working against this client.

use serde_json::Value;

use crate::acl::{AclTrace, TraceTree};
use crate::error::{Error, Result};
use crate::flow::Flow;
use crate::primitives::{DataModelElement, FileLines, Interface, Issue};
use crate::route::BgpRoute;
use crate::trace::{FlowTrace, Trace};

/// A typed table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    AclTrace(AclTrace),
    BgpRoute(BgpRoute),
    FileLines(FileLines),
    Flow(Flow),
    FlowTrace(FlowTrace),
    Interface(Interface),
    Issue(Issue),
    Trace(Trace),
    TraceTree(TraceTree),
    List(Vec<SchemaValue>),
    /// Raw passthrough for schema strings this client does not know.
    Json(Value),
}

impl std::fmt::Display for SchemaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaValue::Null => Ok(()),
            SchemaValue::Bool(v) => write!(f, "{}", v),
            SchemaValue::Int(v) => write!(f, "{}", v),
            SchemaValue::Double(v) => write!(f, "{}", v),
            SchemaValue::Str(v) => write!(f, "{}", v),
            SchemaValue::AclTrace(v) => write!(f, "{}", v),
            SchemaValue::BgpRoute(v) => write!(f, "{}", v),
            SchemaValue::FileLines(v) => write!(f, "{}", v),
            SchemaValue::Flow(v) => write!(f, "{}", v),
            SchemaValue::FlowTrace(v) => write!(f, "{}", v),
            SchemaValue::Interface(v) => write!(f, "{}", v),
            SchemaValue::Issue(v) => write!(f, "{}", v),
            SchemaValue::Trace(v) => write!(f, "{}", v),
            SchemaValue::TraceTree(v) => write!(f, "{}", v),
            SchemaValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            SchemaValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Returns the element type of a `List<T>`/`Set<T>` schema string.
fn collection_inner(schema: &str) -> Option<&str> {
    schema
        .strip_prefix("List<")
        .or_else(|| schema.strip_prefix("Set<"))
        .and_then(|rest| rest.strip_suffix('>'))
}

/// Strips all collection wrappers, yielding the base schema type.
fn base_type(schema: &str) -> &str {
    match collection_inner(schema) {
        Some(inner) => base_type(inner),
        None => schema,
    }
}

/// Converts one raw value according to its declared schema string.
pub fn convert(schema: &str, value: &Value) -> Result<SchemaValue> {
    convert_for_question(schema, value, None)
}

/// Like [`convert`], with the originating question's instance name threaded
/// into `SelfDescribing` error messages.
pub fn convert_for_question(
    schema: &str,
    value: &Value,
    question: Option<&str>,
) -> Result<SchemaValue> {
    if value.is_null() {
        return Ok(SchemaValue::Null);
    }

    if let Some(inner) = collection_inner(schema) {
        let items = value.as_array().ok_or_else(|| {
            Error::Deserialization(format!("expected a list for schema {}: {}", schema, value))
        })?;
        let converted = items
            .iter()
            .map(|item| convert_for_question(inner, item, question))
            .collect::<Result<Vec<_>>>()?;
        // Legacy display quirk: flow trace lists collapse to one
        // newline-separated string.
        if base_type(inner) == "FlowTrace" {
            let rendered: Vec<String> = converted.iter().map(|v| v.to_string()).collect();
            return Ok(SchemaValue::Str(rendered.join("\n")));
        }
        return Ok(SchemaValue::List(converted));
    }

    match schema.to_ascii_lowercase().as_str() {
        "integer" | "long" => return convert_int(schema, value),
        "boolean" => return convert_bool(schema, value),
        "double" => return convert_double(schema, value),
        "string" => {
            return Ok(match value.as_str() {
                Some(s) => SchemaValue::Str(s.to_string()),
                None => SchemaValue::Str(value.to_string()),
            })
        }
        _ => {}
    }

    match schema {
        "AclTrace" => Ok(SchemaValue::AclTrace(AclTrace::from_dict(value)?)),
        "BgpRoute" => Ok(SchemaValue::BgpRoute(BgpRoute::from_dict(value)?)),
        "FileLines" => Ok(SchemaValue::FileLines(FileLines::from_dict(value)?)),
        "Flow" => Ok(SchemaValue::Flow(Flow::from_dict(value)?)),
        "FlowTrace" => Ok(SchemaValue::FlowTrace(FlowTrace::from_dict(value)?)),
        "Interface" => Ok(SchemaValue::Interface(Interface::from_dict(value)?)),
        "Issue" => Ok(SchemaValue::Issue(Issue::from_dict(value)?)),
        "Trace" => Ok(SchemaValue::Trace(Trace::from_dict(value)?)),
        "TraceTree" => Ok(SchemaValue::TraceTree(TraceTree::from_dict(value)?)),
        "Node" => value
            .get("name")
            .and_then(Value::as_str)
            .map(|name| SchemaValue::Str(name.to_string()))
            .ok_or_else(|| {
                Error::Deserialization(format!("Node value has no name: {}", value))
            }),
        "Ip" | "Prefix" => value
            .as_str()
            .map(|s| SchemaValue::Str(s.to_string()))
            .ok_or_else(|| {
                Error::Deserialization(format!("expected a string for schema {}: {}", schema, value))
            }),
        "SelfDescribing" => {
            let inner_schema = value.get("schema").and_then(Value::as_str).ok_or_else(|| {
                Error::Deserialization(match question {
                    Some(q) => format!("SelfDescribing value in {} has no schema: {}", q, value),
                    None => format!("SelfDescribing value has no schema: {}", value),
                })
            })?;
            let inner_value = value.get("value").cloned().unwrap_or(Value::Null);
            convert_for_question(inner_schema, &inner_value, question)
        }
        // Forward compatibility: schemas this client does not know pass
        // through unconverted.
        _ => Ok(SchemaValue::Json(value.clone())),
    }
}

fn convert_int(schema: &str, value: &Value) -> Result<SchemaValue> {
    if let Some(n) = value.as_i64() {
        return Ok(SchemaValue::Int(n));
    }
    value
        .as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .map(SchemaValue::Int)
        .ok_or_else(|| {
            Error::Deserialization(format!("expected an integer for schema {}: {}", schema, value))
        })
}

fn convert_bool(schema: &str, value: &Value) -> Result<SchemaValue> {
    if let Some(b) = value.as_bool() {
        return Ok(SchemaValue::Bool(b));
    }
    value
        .as_str()
        .and_then(|s| s.parse::<bool>().ok())
        .map(SchemaValue::Bool)
        .ok_or_else(|| {
            Error::Deserialization(format!("expected a boolean for schema {}: {}", schema, value))
        })
}

fn convert_double(schema: &str, value: &Value) -> Result<SchemaValue> {
    if let Some(d) = value.as_f64() {
        return Ok(SchemaValue::Double(d));
    }
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .map(SchemaValue::Double)
        .ok_or_else(|| {
            Error::Deserialization(format!("expected a double for schema {}: {}", schema, value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_of_integers() {
        let converted = convert("List<Integer>", &json!([1, 2, 3])).unwrap();
        assert_eq!(
            converted,
            SchemaValue::List(vec![
                SchemaValue::Int(1),
                SchemaValue::Int(2),
                SchemaValue::Int(3)
            ])
        );
    }

    #[test]
    fn test_empty_set_of_strings() {
        let converted = convert("Set<String>", &json!([])).unwrap();
        assert_eq!(converted, SchemaValue::List(vec![]));
    }

    #[test]
    fn test_null_yields_null_for_any_schema() {
        assert_eq!(convert("Flow", &Value::Null).unwrap(), SchemaValue::Null);
        assert_eq!(
            convert("List<Issue>", &Value::Null).unwrap(),
            SchemaValue::Null
        );
    }

    #[test]
    fn test_primitives_case_insensitive() {
        assert_eq!(convert("integer", &json!(5)).unwrap(), SchemaValue::Int(5));
        assert_eq!(convert("Integer", &json!("5")).unwrap(), SchemaValue::Int(5));
        assert_eq!(
            convert("Boolean", &json!(true)).unwrap(),
            SchemaValue::Bool(true)
        );
        assert_eq!(
            convert("Double", &json!(1.5)).unwrap(),
            SchemaValue::Double(1.5)
        );
    }

    #[test]
    fn test_node_extracts_name() {
        let converted = convert("Node", &json!({"name": "r1", "id": "node-1"})).unwrap();
        assert_eq!(converted, SchemaValue::Str("r1".into()));
    }

    #[test]
    fn test_ip_and_prefix_pass_through() {
        assert_eq!(
            convert("Ip", &json!("10.0.0.1")).unwrap(),
            SchemaValue::Str("10.0.0.1".into())
        );
        assert_eq!(
            convert("Prefix", &json!("10.0.0.0/24")).unwrap(),
            SchemaValue::Str("10.0.0.0/24".into())
        );
    }

    #[test]
    fn test_self_describing_recurses() {
        let converted = convert(
            "SelfDescribing",
            &json!({"schema": "Integer", "value": 42}),
        )
        .unwrap();
        assert_eq!(converted, SchemaValue::Int(42));
    }

    #[test]
    fn test_self_describing_missing_schema_is_error() {
        let err =
            convert_for_question("SelfDescribing", &json!({"value": 42}), Some("q1")).unwrap_err();
        assert!(err.to_string().contains("q1"));
    }

    #[test]
    fn test_unknown_schema_passes_through() {
        let raw = json!({"future": "thing"});
        assert_eq!(
            convert("HyperRoute", &raw).unwrap(),
            SchemaValue::Json(raw.clone())
        );
    }

    #[test]
    fn test_flow_trace_list_joins_to_string() {
        let traces = json!([
            {"disposition": "ACCEPTED", "hops": [], "notes": "ACCEPTED"},
            {"disposition": "DENIED_IN", "hops": [], "notes": "DENIED_IN{acl}"}
        ]);
        match convert("List<FlowTrace>", &traces).unwrap() {
            SchemaValue::Str(joined) => {
                assert!(joined.contains("ACCEPTED"));
                assert!(joined.contains("DENIED_IN{acl}"));
                assert!(joined.contains('\n'));
            }
            other => panic!("expected joined string, got {:?}", other),
        }
    }

    #[test]
    fn test_structured_type_dispatch() {
        let converted = convert(
            "Interface",
            &json!({"hostname": "r1", "interface": "eth0"}),
        )
        .unwrap();
        assert_eq!(converted.to_string(), "r1[eth0]");
    }
}
