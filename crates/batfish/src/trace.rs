//! Forwarding traces: the tree of hops and steps a flow takes.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::flow::Flow;
use crate::primitives::{DataModelElement, Edge};
use crate::route::NextHop;

/// One route that participated in a routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    pub protocol: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<NextHop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<i64>,
}

impl std::fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}", self.network, self.protocol)?;
        if let Some(next_hop) = &self.next_hop {
            write!(f, ", next hop: {}", next_hop)?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterInputIfaceStepDetail {
    pub input_interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_vrf: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitOutputIfaceStepDetail {
    pub output_interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed_flow: Option<Flow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStepDetail {
    #[serde(default)]
    pub routes: Vec<RouteInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundStepDetail {
    #[serde(default)]
    pub interface: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginateStepDetail {
    pub originating_vrf: String,
}

/// Detail payload of a [`Step`], selected by the wire `"type"` field.
#[derive(Debug, Clone, PartialEq)]
pub enum StepDetail {
    EnterInputInterface(EnterInputIfaceStepDetail),
    ExitOutputInterface(ExitOutputIfaceStepDetail),
    Routing(RoutingStepDetail),
    Inbound(InboundStepDetail),
    Originate(OriginateStepDetail),
}

impl StepDetail {
    fn type_name(&self) -> &'static str {
        match self {
            StepDetail::EnterInputInterface(_) => "EnterInputInterface",
            StepDetail::ExitOutputInterface(_) => "ExitOutputInterface",
            StepDetail::Routing(_) => "Routing",
            StepDetail::Inbound(_) => "Inbound",
            StepDetail::Originate(_) => "Originate",
        }
    }

    fn to_value(&self) -> Value {
        match self {
            StepDetail::EnterInputInterface(d) => serde_json::to_value(d),
            StepDetail::ExitOutputInterface(d) => serde_json::to_value(d),
            StepDetail::Routing(d) => serde_json::to_value(d),
            StepDetail::Inbound(d) => serde_json::to_value(d),
            StepDetail::Originate(d) => serde_json::to_value(d),
        }
        .unwrap_or_default()
    }
}

impl std::fmt::Display for StepDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepDetail::EnterInputInterface(d) => write!(f, "{}", d.input_interface),
            StepDetail::ExitOutputInterface(d) => write!(f, "{}", d.output_interface),
            StepDetail::Routing(d) => {
                let routes: Vec<String> = d.routes.iter().map(|r| r.to_string()).collect();
                write!(f, "{}", routes.join(", "))
            }
            StepDetail::Inbound(d) => write!(f, "{}", d.interface),
            StepDetail::Originate(d) => write!(f, "{}", d.originating_vrf),
        }
    }
}

/// One action taken by a node while forwarding a flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub action: String,
    pub detail: StepDetail,
}

impl Step {
    /// Parses one step object. Returns `Ok(None)` for step types this client
    /// does not recognize; those are dropped from the hop, not an error.
    fn parse(value: &Value) -> Result<Option<Step>> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Deserialization(format!("Step is missing action: {}", value))
            })?
            .to_string();
        let detail_value = value.get("detail").cloned().unwrap_or_else(|| json!({}));
        let parse_err =
            |e: serde_json::Error| Error::Deserialization(format!("Step detail: {}", e));
        let detail = match value.get("type").and_then(Value::as_str) {
            Some("EnterInputInterface") => StepDetail::EnterInputInterface(
                serde_json::from_value(detail_value).map_err(parse_err)?,
            ),
            Some("ExitOutputInterface") => StepDetail::ExitOutputInterface(
                serde_json::from_value(detail_value).map_err(parse_err)?,
            ),
            Some("Routing") => {
                StepDetail::Routing(serde_json::from_value(detail_value).map_err(parse_err)?)
            }
            Some("Inbound") => {
                StepDetail::Inbound(serde_json::from_value(detail_value).map_err(parse_err)?)
            }
            Some("Originate") => {
                StepDetail::Originate(serde_json::from_value(detail_value).map_err(parse_err)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(Step { action, detail }))
    }

    fn to_value(&self) -> Value {
        json!({
            "type": self.detail.type_name(),
            "action": self.action,
            "detail": self.detail.to_value(),
        })
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let detail = self.detail.to_string();
        if detail.is_empty() {
            write!(f, "{}", self.action)
        } else {
            write!(f, "{}({})", self.action, detail)
        }
    }
}

/// The actions one node took on a flow, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub node: String,
    pub steps: Vec<Step>,
}

impl Hop {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::ops::Index<usize> for Hop {
    type Output = Step;

    fn index(&self, index: usize) -> &Step {
        &self.steps[index]
    }
}

impl<'de> Deserialize<'de> for Hop {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let node = value
            .get("node")
            .and_then(|n| n.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::custom(format!("Hop is missing node name: {}", value)))?
            .to_string();
        let mut steps = Vec::new();
        if let Some(raw_steps) = value.get("steps").and_then(Value::as_array) {
            for raw in raw_steps {
                if let Some(step) = Step::parse(raw).map_err(D::Error::custom)? {
                    steps.push(step);
                }
            }
        }
        Ok(Hop { node, steps })
    }
}

impl Serialize for Hop {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let steps: Vec<Value> = self.steps.iter().map(Step::to_value).collect();
        json!({"node": {"name": self.node}, "steps": steps}).serialize(serializer)
    }
}

impl DataModelElement for Hop {
    const NAME: &'static str = "Hop";
}

impl std::fmt::Display for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node: {}", self.node)?;
        for step in &self.steps {
            write!(f, "\n  {}", step)?;
        }
        Ok(())
    }
}

/// One path a flow can take, with its final disposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub disposition: String,
    #[serde(default)]
    pub hops: Vec<Hop>,
}

impl DataModelElement for Trace {
    const NAME: &'static str = "Trace";
}

impl Trace {
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

impl std::ops::Index<usize> for Trace {
    type Output = Hop;

    fn index(&self, index: usize) -> &Hop {
        &self.hops[index]
    }
}

impl std::fmt::Display for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.disposition)?;
        for (i, hop) in self.hops.iter().enumerate() {
            write!(f, "\n{}. {}", i + 1, hop)?;
        }
        Ok(())
    }
}

/// One hop of a legacy text-oriented flow trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowTraceHop {
    pub edge: Edge,
    #[serde(default)]
    pub routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed_flow: Option<Flow>,
}

impl std::fmt::Display for FlowTraceHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.edge)?;
        if !self.routes.is_empty() {
            write!(f, " routes: [{}]", self.routes.join(", "))?;
        }
        Ok(())
    }
}

/// A legacy flow trace: a flat hop list with free-form notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTrace {
    pub disposition: String,
    #[serde(default)]
    pub hops: Vec<FlowTraceHop>,
    #[serde(default)]
    pub notes: String,
}

impl DataModelElement for FlowTrace {
    const NAME: &'static str = "FlowTrace";
}

impl std::fmt::Display for FlowTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            writeln!(f, "{} {}", i + 1, hop)?;
        }
        write!(f, "{}", self.notes)
    }
}
