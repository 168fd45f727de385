//! Question templates, bound questions, and parameter validation.
//!
//! A [`QuestionTemplate`] is the backend-declared shape of one question:
//! its name, documentation, and variable declarations. Instantiating a
//! template with concrete parameter values produces a bound [`Question`].
//! Bound questions are terminal; validation runs against the declarations
//! before every submission and accumulates every violation into a single
//! error rather than stopping at the first.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

const COMPARATORS: [&str; 6] = ["<", "<=", "==", ">=", ">", "!="];
const PROTOCOLS: [&str; 4] = ["dns", "ssh", "tcp", "udp"];

/// One allowed value of a variable, with optional documentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowedValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A declared question parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub var_type: String,
    #[serde(default)]
    pub optional: bool,
    /// Default value used when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_elements: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Deprecated spelling of the allowed-value constraint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<AllowedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Variable {
    /// Allowed values from both spellings of the constraint.
    pub fn allowed(&self) -> Vec<&str> {
        self.allowed_values
            .iter()
            .map(String::as_str)
            .chain(self.values.iter().map(|v| v.name.as_str()))
            .collect()
    }
}

/// The backend-declared template of one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionTemplate {
    pub name: String,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub tags: Vec<String>,
    pub variables: BTreeMap<String, Variable>,
    pub differential: bool,
    raw: Value,
}

impl QuestionTemplate {
    /// Parses a template from its backend JSON form:
    /// `{class, instance: {instanceName, description, ..., variables}, differential?}`.
    pub fn from_dict(value: &Value) -> Result<QuestionTemplate> {
        let instance = value.get("instance").ok_or_else(|| {
            Error::Deserialization(format!("question template is missing instance: {}", value))
        })?;
        let name = instance
            .get("instanceName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Deserialization("question template is missing instanceName".to_string())
            })?
            .to_string();
        let variables = match instance.get("variables") {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                Error::Deserialization(format!("variables of question {}: {}", name, e))
            })?,
            None => BTreeMap::new(),
        };
        Ok(QuestionTemplate {
            name,
            description: instance
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            long_description: instance
                .get("longDescription")
                .and_then(Value::as_str)
                .map(String::from),
            tags: instance
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            variables,
            differential: value
                .get("differential")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            raw: value.clone(),
        })
    }

    /// Binds the template to concrete parameter values.
    ///
    /// Only declared parameter names are accepted. The instance name is the
    /// caller's, or auto-generated with a UUID suffix.
    pub fn instantiate(
        &self,
        instance_name: Option<&str>,
        args: HashMap<String, Value>,
    ) -> Result<Question> {
        let mut undeclared: Vec<&str> = args
            .keys()
            .filter(|name| !self.variables.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !undeclared.is_empty() {
            undeclared.sort_unstable();
            let lines: Vec<String> = undeclared
                .iter()
                .map(|name| format!("Unknown parameter {} for question {}", name, self.name))
                .collect();
            return Err(Error::Validation(lines.join("\n")));
        }
        let instance_name = match instance_name {
            Some(name) => name.to_string(),
            None => format!("__{}_{}", self.name, Uuid::new_v4()),
        };
        Ok(Question {
            template: self.clone(),
            instance_name,
            differential: self.differential,
            values: args,
        })
    }
}

/// A question bound to concrete parameter values, ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    template: QuestionTemplate,
    pub instance_name: String,
    pub differential: bool,
    values: HashMap<String, Value>,
}

impl Question {
    /// The template name this question was bound from.
    pub fn name(&self) -> &str {
        &self.template.name
    }

    /// Checks every supplied value against its declaration.
    ///
    /// Does not short-circuit: all violations are collected and reported in
    /// one error, one line each.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        for (name, var) in &self.template.variables {
            let supplied = self
                .values
                .get(name)
                .or(var.value.as_ref())
                .filter(|v| !v.is_null());
            let value = match supplied {
                Some(value) => value,
                None => {
                    if !var.optional {
                        problems.push(format!("Missing value for mandatory parameter {}", name));
                    }
                    continue;
                }
            };
            if var.min_elements.is_some() {
                self.validate_list(name, var, value, &mut problems);
            } else if let Err(reason) = check_value(value, var) {
                problems.push(format!("Parameter {}: {}", name, reason));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems.join("\n")))
        }
    }

    fn validate_list(&self, name: &str, var: &Variable, value: &Value, problems: &mut Vec<String>) {
        let min_elements = var.min_elements.unwrap_or(0);
        let items = match value.as_array() {
            Some(items) => items,
            None => {
                problems.push(format!(
                    "Parameter {}: expected a list of {} values, got {}",
                    name, var.var_type, value
                ));
                return;
            }
        };
        if (items.len() as u64) < min_elements {
            problems.push(format!(
                "Parameter {}: must have at least {} elements, got {}",
                name,
                min_elements,
                items.len()
            ));
        }
        for (i, item) in items.iter().enumerate() {
            if let Err(reason) = check_value(item, var) {
                problems.push(format!("Element {} of parameter {}: {}", i, name, reason));
            }
        }
    }

    /// Wire form of the bound question: the template JSON with the instance
    /// name, supplied values, and differential flag filled in.
    pub fn to_wire(&self) -> Value {
        let mut wire = self.template.raw.clone();
        if let Some(root) = wire.as_object_mut() {
            root.insert("differential".to_string(), Value::Bool(self.differential));
            if let Some(instance) = root.get_mut("instance").and_then(Value::as_object_mut) {
                instance.insert(
                    "instanceName".to_string(),
                    Value::String(self.instance_name.clone()),
                );
                if let Some(variables) =
                    instance.get_mut("variables").and_then(Value::as_object_mut)
                {
                    for (name, value) in &self.values {
                        if let Some(decl) = variables.get_mut(name).and_then(Value::as_object_mut)
                        {
                            decl.insert("value".to_string(), value.clone());
                        }
                    }
                }
            }
        }
        wire
    }
}

/// Checks one scalar (or list element) against its declaration: type first,
/// then minimum length, then allowed-value membership.
fn check_value(value: &Value, var: &Variable) -> std::result::Result<(), String> {
    check_type(value, &var.var_type)?;
    if let Some(min_length) = var.min_length {
        if let Some(s) = value.as_str() {
            if (s.len() as u64) < min_length {
                return Err(format!(
                    "expected {} of length at least {}, got {:?}",
                    var.var_type, min_length, s
                ));
            }
        }
    }
    let allowed = var.allowed();
    if !allowed.is_empty() {
        if let Some(s) = value.as_str() {
            if !allowed.contains(&s) {
                return Err(format!(
                    "{:?} is not one of the allowed values {:?}",
                    s, allowed
                ));
            }
        }
    }
    Ok(())
}

/// Type checks for the declared semantic type tags.
///
/// Types this client does not know are accepted with a logged warning so a
/// newer backend's templates keep working.
fn check_type(value: &Value, var_type: &str) -> std::result::Result<(), String> {
    let expect = |condition: bool, reason: String| if condition { Ok(()) } else { Err(reason) };
    match var_type {
        "boolean" => expect(
            value.is_boolean(),
            format!("expected boolean, got {}", value),
        ),
        "integer" => expect(
            value
                .as_i64()
                .map(|n| i32::try_from(n).is_ok())
                .unwrap_or(false),
            format!("expected 32-bit integer, got {}", value),
        ),
        "long" => expect(
            value.as_i64().is_some(),
            format!("expected long, got {}", value),
        ),
        "float" | "double" => expect(
            value.as_f64().is_some(),
            format!("expected {}, got {}", var_type, value),
        ),
        "comparator" => expect(
            value
                .as_str()
                .map(|s| COMPARATORS.contains(&s))
                .unwrap_or(false),
            format!("expected one of {:?}, got {}", COMPARATORS, value),
        ),
        "ip" => expect(
            value.as_str().map(is_valid_ip).unwrap_or(false),
            format!("expected ip, got {}", value),
        ),
        "prefix" => expect(
            value.as_str().map(is_valid_prefix).unwrap_or(false),
            format!("expected prefix, got {}", value),
        ),
        "prefixRange" => expect(
            value.as_str().map(is_valid_prefix_range).unwrap_or(false),
            format!("expected prefix range, got {}", value),
        ),
        "ipWildcard" => expect(
            value.as_str().map(is_valid_ip_wildcard).unwrap_or(false),
            format!("expected ip wildcard, got {}", value),
        ),
        "subrange" => match value {
            Value::Number(n) if n.is_i64() => Ok(()),
            Value::String(s) => expect(
                is_valid_subrange(s),
                format!("expected subrange, got {:?}", s),
            ),
            _ => Err(format!("expected subrange, got {}", value)),
        },
        "javaRegex" | "string" => expect(
            value.is_string(),
            format!("expected {}, got {}", var_type, value),
        ),
        "jsonPathRegex" => {
            let s = value
                .as_str()
                .ok_or_else(|| format!("expected jsonPathRegex, got {}", value))?;
            check_json_path_regex(s)
        }
        "jsonPath" => check_json_path(value),
        "protocol" => {
            let s = value
                .as_str()
                .ok_or_else(|| format!("expected protocol, got {}", value))?;
            expect(
                PROTOCOLS.contains(&s.to_ascii_lowercase().as_str()),
                format!("{:?} is not one of the protocols {:?}", s, PROTOCOLS),
            )
        }
        "ipProtocol" => {
            let s = value
                .as_str()
                .ok_or_else(|| format!("expected ipProtocol, got {}", value))?;
            // Numeric strings must be valid protocol numbers; anything else
            // is deferred to the backend.
            match s.parse::<i64>() {
                Ok(n) => expect(
                    (0..=255).contains(&n),
                    format!("ipProtocol number {} is out of range 0-255", n),
                ),
                Err(_) => Ok(()),
            }
        }
        _ => {
            warn!("No validation for parameter type {}; accepting value as-is", var_type);
            Ok(())
        }
    }
}

fn is_valid_ip(s: &str) -> bool {
    // The backend uses sentinel spellings for special addresses.
    for prefix in ["INVALID_IP(", "AUTO/NONE("] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return rest
                .strip_suffix("l)")
                .map(|n| n.parse::<i64>().is_ok())
                .unwrap_or(false);
        }
    }
    let octets: Vec<&str> = s.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| o.parse::<u8>().is_ok())
}

fn is_valid_prefix(s: &str) -> bool {
    match s.split_once('/') {
        Some((ip, length)) => is_valid_ip(ip) && length.parse::<u32>().is_ok(),
        None => false,
    }
}

fn is_valid_prefix_range(s: &str) -> bool {
    match s.split_once(':') {
        Some((prefix, range)) => is_valid_prefix(prefix) && is_valid_subrange(range),
        None => is_valid_prefix(s),
    }
}

fn is_valid_ip_wildcard(s: &str) -> bool {
    if let Some((ip, mask)) = s.split_once(':') {
        return is_valid_ip(ip) && is_valid_ip(mask);
    }
    if s.contains('/') {
        return is_valid_prefix(s);
    }
    is_valid_ip(s)
}

fn is_valid_subrange(s: &str) -> bool {
    match s.split_once('-') {
        Some((start, end)) => start.parse::<i64>().is_ok() && end.parse::<i64>().is_ok(),
        None => s.parse::<i64>().is_ok(),
    }
}

fn check_json_path_regex(s: &str) -> std::result::Result<(), String> {
    let inner = if let Some(rest) = s.strip_prefix('/') {
        rest.strip_suffix("/i")
            .or_else(|| rest.strip_suffix('/'))
            .ok_or_else(|| {
                format!("expected jsonPathRegex in /regex/ form, got {:?}", s)
            })?
    } else {
        s
    };
    Regex::new(inner).map(|_| ()).map_err(|e| {
        format!("expected a valid jsonPathRegex, got {:?}: {}", s, e)
    })
}

fn check_json_path(value: &Value) -> std::result::Result<(), String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("expected jsonPath object, got {}", value))?;
    if !object.get("path").map(Value::is_string).unwrap_or(false) {
        return Err(format!("jsonPath requires a string path, got {}", value));
    }
    if let Some(suffix) = object.get("suffix") {
        if !suffix.is_boolean() {
            return Err(format!("jsonPath suffix must be a boolean, got {}", suffix));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(variables: Value) -> QuestionTemplate {
        QuestionTemplate::from_dict(&json!({
            "class": "org.batfish.question.TestQuestion",
            "instance": {
                "instanceName": "testQuestion",
                "description": "A question for tests",
                "variables": variables
            }
        }))
        .unwrap()
    }

    fn bind(variables: Value, args: Value) -> Question {
        let args: HashMap<String, Value> =
            serde_json::from_value(args).expect("test args are an object");
        template(variables).instantiate(Some("bound"), args).unwrap()
    }

    #[test]
    fn test_missing_mandatory_parameters_all_reported() {
        let q = bind(
            json!({
                "first": {"type": "string"},
                "second": {"type": "string"}
            }),
            json!({}),
        );
        let err = q.validate().unwrap_err().to_string();
        assert!(err.contains("first"));
        assert!(err.contains("second"));
    }

    #[test]
    fn test_optional_parameter_may_be_absent() {
        let q = bind(
            json!({"nodes": {"type": "string", "optional": true}}),
            json!({}),
        );
        q.validate().unwrap();
    }

    #[test]
    fn test_default_value_satisfies_mandatory() {
        let q = bind(
            json!({"nodes": {"type": "string", "value": ".*"}}),
            json!({}),
        );
        q.validate().unwrap();
    }

    #[test]
    fn test_undeclared_parameter_is_rejected() {
        let err = template(json!({"nodes": {"type": "string"}}))
            .instantiate(None, HashMap::from([("bogus".to_string(), json!("x"))]))
            .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_auto_instance_name_has_uuid_suffix() {
        let q = template(json!({}))
            .instantiate(None, HashMap::new())
            .unwrap();
        assert!(q.instance_name.starts_with("__testQuestion_"));
        assert!(q.instance_name.len() > "__testQuestion_".len());
    }

    #[test]
    fn test_ip_validation() {
        let vars = json!({"addr": {"type": "ip"}});
        bind(vars.clone(), json!({"addr": "10.0.0.1"})).validate().unwrap();
        bind(vars.clone(), json!({"addr": "INVALID_IP(12345l)"}))
            .validate()
            .unwrap();
        let err = bind(vars, json!({"addr": "300.1.1.1"}))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("expected ip"));
    }

    #[test]
    fn test_prefix_and_wildcard_validation() {
        let vars = json!({
            "net": {"type": "prefix", "optional": true},
            "wild": {"type": "ipWildcard", "optional": true}
        });
        bind(vars.clone(), json!({"net": "10.0.0.0/24"})).validate().unwrap();
        bind(vars.clone(), json!({"wild": "1.2.3.4:0.0.0.255"}))
            .validate()
            .unwrap();
        assert!(bind(vars, json!({"net": "10.0.0.0"})).validate().is_err());
    }

    #[test]
    fn test_subrange_validation() {
        let vars = json!({"range": {"type": "subrange"}});
        bind(vars.clone(), json!({"range": "10-20"})).validate().unwrap();
        bind(vars.clone(), json!({"range": 5})).validate().unwrap();
        assert!(bind(vars, json!({"range": "abc"})).validate().is_err());
    }

    #[test]
    fn test_comparator_validation() {
        let vars = json!({"cmp": {"type": "comparator"}});
        bind(vars.clone(), json!({"cmp": "<="})).validate().unwrap();
        assert!(bind(vars, json!({"cmp": "=<"})).validate().is_err());
    }

    #[test]
    fn test_integer_range() {
        let vars = json!({"n": {"type": "integer"}});
        bind(vars.clone(), json!({"n": 2147483647i64})).validate().unwrap();
        assert!(bind(vars, json!({"n": 2147483648i64})).validate().is_err());
    }

    #[test]
    fn test_json_path_validation() {
        let vars = json!({"path": {"type": "jsonPath"}});
        bind(vars.clone(), json!({"path": {"path": "$.nodes", "suffix": true}}))
            .validate()
            .unwrap();
        assert!(bind(vars.clone(), json!({"path": {"suffix": true}}))
            .validate()
            .is_err());
        assert!(bind(vars, json!({"path": "$.nodes"})).validate().is_err());
    }

    #[test]
    fn test_json_path_regex_validation() {
        let vars = json!({"rex": {"type": "jsonPathRegex"}});
        bind(vars.clone(), json!({"rex": "/border-.*/i"})).validate().unwrap();
        bind(vars.clone(), json!({"rex": "/core/"})).validate().unwrap();
        assert!(bind(vars.clone(), json!({"rex": "/unterminated"}))
            .validate()
            .is_err());
        assert!(bind(vars, json!({"rex": "/bad[/"})).validate().is_err());
    }

    #[test]
    fn test_ip_protocol_is_lenient_for_names() {
        let vars = json!({"proto": {"type": "ipProtocol"}});
        bind(vars.clone(), json!({"proto": "tcp"})).validate().unwrap();
        bind(vars.clone(), json!({"proto": "17"})).validate().unwrap();
        let err = bind(vars, json!({"proto": "700"})).validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_unknown_type_accepted() {
        let q = bind(
            json!({"spec": {"type": "nodeSpec"}}),
            json!({"spec": ["anything", 5]}),
        );
        q.validate().unwrap();
    }

    #[test]
    fn test_list_minimum_elements() {
        let vars = json!({"nodes": {"type": "string", "minElements": 2}});
        let err = bind(vars.clone(), json!({"nodes": ["one"]}))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("at least 2"));
        bind(vars, json!({"nodes": ["one", "two"]})).validate().unwrap();
    }

    #[test]
    fn test_list_value_must_be_list() {
        let vars = json!({"nodes": {"type": "string", "minElements": 0}});
        let err = bind(vars, json!({"nodes": "one"})).validate().unwrap_err();
        assert!(err.to_string().contains("expected a list"));
    }

    #[test]
    fn test_list_elements_type_checked() {
        let vars = json!({"addrs": {"type": "ip", "minElements": 1}});
        let err = bind(vars, json!({"addrs": ["10.0.0.1", "nonsense"]}))
            .validate()
            .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("Element 1"));
        assert!(!rendered.contains("Element 0 "));
    }

    #[test]
    fn test_min_length_and_allowed_values() {
        let vars = json!({
            "mode": {"type": "string", "minLength": 3,
                     "values": [{"name": "full"}, {"name": "fast"}]}
        });
        bind(vars.clone(), json!({"mode": "full"})).validate().unwrap();
        assert!(bind(vars.clone(), json!({"mode": "xy"})).validate().is_err());
        assert!(bind(vars, json!({"mode": "slow"})).validate().is_err());
    }

    #[test]
    fn test_validation_failures_accumulate_across_parameters() {
        let q = bind(
            json!({
                "addr": {"type": "ip"},
                "cmp": {"type": "comparator"}
            }),
            json!({"addr": "bad", "cmp": "=<"}),
        );
        let err = q.validate().unwrap_err().to_string();
        assert_eq!(err.lines().count(), 3); // header line plus one per violation
        assert!(err.contains("addr"));
        assert!(err.contains("cmp"));
    }

    #[test]
    fn test_to_wire_fills_instance() {
        let q = bind(
            json!({"nodes": {"type": "string"}}),
            json!({"nodes": "border-.*"}),
        );
        let wire = q.to_wire();
        assert_eq!(wire["instance"]["instanceName"], "bound");
        assert_eq!(wire["instance"]["variables"]["nodes"]["value"], "border-.*");
        assert_eq!(wire["differential"], false);
    }

    #[test]
    fn test_template_metadata_parsed() {
        let t = template(json!({"nodes": {"type": "string", "optional": true}}));
        assert_eq!(t.name, "testQuestion");
        assert_eq!(t.description.as_deref(), Some("A question for tests"));
        assert!(!t.differential);
        assert_eq!(t.variables.len(), 1);
    }
}
