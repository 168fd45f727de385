//! ACL traces and the generic trace trees newer answers use.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::primitives::{DataModelElement, VendorStructureId};

/// One event in a legacy ACL trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclTraceEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DataModelElement for AclTraceEvent {
    const NAME: &'static str = "AclTraceEvent";
}

impl std::fmt::Display for AclTraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description.as_deref().unwrap_or(""))
    }
}

/// The events an ACL evaluation produced, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclTrace {
    #[serde(default)]
    pub events: Vec<AclTraceEvent>,
}

impl DataModelElement for AclTrace {
    const NAME: &'static str = "AclTrace";
}

impl std::fmt::Display for AclTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.events.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", rendered.join("\n"))
    }
}

/// A piece of a [`TraceElement`]: plain text, or text linked to a vendor
/// structure. Selected by the wire `"type"` field; unknown discriminators
/// are a hard error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Fragment {
    Text {
        text: String,
    },
    Link {
        text: String,
        #[serde(rename = "vendorStructureId")]
        vendor_structure_id: VendorStructureId,
    },
}

impl Fragment {
    pub fn text(&self) -> &str {
        match self {
            Fragment::Text { text } => text,
            Fragment::Link { text, .. } => text,
        }
    }
}

impl DataModelElement for Fragment {
    const NAME: &'static str = "Fragment";

    fn from_dict(value: &Value) -> Result<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some("text") | Some("link") => serde_json::from_value(value.clone())
                .map_err(|e| Error::Deserialization(format!("Fragment: {}", e))),
            _ => Err(Error::Deserialization(format!(
                "Unknown fragment type: {}",
                value
            ))),
        }
    }
}

/// A human-readable trace message assembled from fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceElement {
    #[serde(default)]
    pub fragments: Vec<Fragment>,
}

impl DataModelElement for TraceElement {
    const NAME: &'static str = "TraceElement";

    fn from_dict(value: &Value) -> Result<Self> {
        let mut fragments = Vec::new();
        if let Some(raw) = value.get("fragments").and_then(Value::as_array) {
            for fragment in raw {
                fragments.push(Fragment::from_dict(fragment)?);
            }
        }
        Ok(TraceElement { fragments })
    }
}

impl std::fmt::Display for TraceElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for fragment in &self.fragments {
            write!(f, "{}", fragment.text())?;
        }
        Ok(())
    }
}

/// A nested trace: one element plus the sub-traces it explains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceTree {
    pub trace_element: TraceElement,
    #[serde(default)]
    pub children: Vec<TraceTree>,
}

impl DataModelElement for TraceTree {
    const NAME: &'static str = "TraceTree";
}

impl TraceTree {
    fn render(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        if depth > 0 {
            write!(f, "\n{}- ", "  ".repeat(depth))?;
        }
        write!(f, "{}", self.trace_element)?;
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for TraceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.render(f, 0)
    }
}
