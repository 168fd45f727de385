//! Shared value types that appear inside table answers.
//!
//! Every datamodel type round-trips between its JSON wire form and a typed
//! value via [`DataModelElement::from_dict`] and [`DataModelElement::dict`].
//! Equality is structural.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Round-trip between a datamodel value and its JSON wire form.
///
/// The default implementations cover types whose serde derives already match
/// the wire shape; types that need wire-only renames or injected
/// discriminators override `dict` (and keep their in-memory field names).
pub trait DataModelElement: Serialize + DeserializeOwned {
    /// Name used in deserialization error messages.
    const NAME: &'static str;

    fn from_dict(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::Deserialization(format!("{}: {}", Self::NAME, e)))
    }

    fn dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// A directed link between two node interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub node1: String,
    pub node1interface: String,
    pub node2: String,
    pub node2interface: String,
}

impl DataModelElement for Edge {
    const NAME: &'static str = "Edge";
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.node1, self.node1interface, self.node2, self.node2interface
        )
    }
}

/// An interface on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub hostname: String,
    pub interface: String,
}

impl DataModelElement for Interface {
    const NAME: &'static str = "Interface";
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.hostname, self.interface)
    }
}

/// A set of lines in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLines {
    pub filename: String,
    #[serde(default)]
    pub lines: Vec<i64>,
}

impl DataModelElement for FileLines {
    const NAME: &'static str = "FileLines";
}

impl std::fmt::Display for FileLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.filename, self.lines)
    }
}

/// Major and minor classification of an [`Issue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueType {
    pub major: String,
    pub minor: String,
}

impl Default for IssueType {
    fn default() -> Self {
        IssueType {
            major: "Unknown".to_string(),
            minor: "Unknown".to_string(),
        }
    }
}

fn default_explanation() -> String {
    "No explanation".to_string()
}

/// An issue found while analyzing a snapshot.
///
/// `severity` is mandatory on the wire; a payload without it is a
/// deserialization error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: i64,
    #[serde(default = "default_explanation")]
    pub explanation: String,
    #[serde(rename = "type", default)]
    pub issue_type: IssueType,
}

impl DataModelElement for Issue {
    const NAME: &'static str = "Issue";
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}: {}] {}",
            self.issue_type.major, self.issue_type.minor, self.explanation
        )
    }
}

/// Identifies a vendor structure in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorStructureId {
    pub filename: String,
    pub structure_type: String,
    pub structure_name: String,
}

impl DataModelElement for VendorStructureId {
    const NAME: &'static str = "VendorStructureId";
}

impl std::fmt::Display for VendorStructureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.structure_name, self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edge_roundtrip() {
        let edge = Edge {
            node1: "r1".into(),
            node1interface: "eth0".into(),
            node2: "r2".into(),
            node2interface: "eth1".into(),
        };
        assert_eq!(Edge::from_dict(&edge.dict()).unwrap(), edge);
        assert_eq!(edge.to_string(), "r1:eth0 -> r2:eth1");
    }

    #[test]
    fn test_interface_display() {
        let iface = Interface {
            hostname: "r1".into(),
            interface: "GigabitEthernet0/0".into(),
        };
        assert_eq!(iface.to_string(), "r1[GigabitEthernet0/0]");
        assert_eq!(Interface::from_dict(&iface.dict()).unwrap(), iface);
    }

    #[test]
    fn test_file_lines_default_lines() {
        let fl = FileLines::from_dict(&json!({"filename": "configs/r1.cfg"})).unwrap();
        assert_eq!(fl.filename, "configs/r1.cfg");
        assert!(fl.lines.is_empty());
    }

    #[test]
    fn test_issue_defaults() {
        let issue = Issue::from_dict(&json!({"severity": 100})).unwrap();
        assert_eq!(issue.severity, 100);
        assert_eq!(issue.explanation, "No explanation");
        assert_eq!(issue.issue_type.major, "Unknown");
        assert_eq!(issue.issue_type.minor, "Unknown");
    }

    #[test]
    fn test_issue_missing_severity() {
        let err = Issue::from_dict(&json!({"explanation": "broken"})).unwrap_err();
        assert!(err.to_string().contains("Issue"));
    }

    #[test]
    fn test_issue_roundtrip() {
        let issue = Issue::from_dict(&json!({
            "severity": 50,
            "explanation": "duplicate route",
            "type": {"major": "Routing", "minor": "Duplicate"}
        }))
        .unwrap();
        assert_eq!(Issue::from_dict(&issue.dict()).unwrap(), issue);
    }

    #[test]
    fn test_vendor_structure_id_roundtrip() {
        let vsid = VendorStructureId {
            filename: "configs/r1.cfg".into(),
            structure_type: "route-map".into(),
            structure_name: "RM-EXPORT".into(),
        };
        let d = vsid.dict();
        assert_eq!(d["structureType"], "route-map");
        assert_eq!(VendorStructureId::from_dict(&d).unwrap(), vsid);
    }
}
