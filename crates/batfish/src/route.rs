//! Routes and next hops.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::primitives::DataModelElement;

/// Legacy discriminator the backend expects when deserializing a
/// [`BgpRoute`] sent from the client.
const BGP_ROUTE_CLASS: &str = "org.batfish.datamodel.questions.BgpRoute";

/// Where a route sends matching packets next.
///
/// A closed family selected by the wire `"type"` field. Unknown
/// discriminators are a hard error; see [`NextHop::from_dict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NextHop {
    Discard,
    Interface {
        interface: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip: Option<String>,
    },
    Ip {
        ip: String,
    },
    Vrf {
        vrf: String,
    },
    Vtep {
        vni: i64,
        vtep: String,
    },
}

impl DataModelElement for NextHop {
    const NAME: &'static str = "NextHop";

    /// Dispatches strictly on the `"type"` field. An absent or unrecognized
    /// type names the offending JSON in the error.
    fn from_dict(value: &Value) -> Result<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some("discard") | Some("interface") | Some("ip") | Some("vrf") | Some("vtep") => {
                serde_json::from_value(value.clone())
                    .map_err(|e| Error::Deserialization(format!("NextHop: {}", e)))
            }
            _ => Err(Error::Deserialization(format!(
                "Unrecognized next hop: {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for NextHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextHop::Discard => write!(f, "discard"),
            NextHop::Interface { interface, ip } => match ip {
                Some(ip) => write!(f, "interface {} ip {}", interface, ip),
                None => write!(f, "interface {}", interface),
            },
            NextHop::Ip { ip } => write!(f, "ip {}", ip),
            NextHop::Vrf { vrf } => write!(f, "vrf {}", vrf),
            NextHop::Vtep { vni, vtep } => write!(f, "vni {} vtep {}", vni, vtep),
        }
    }
}

/// A BGP route attribute bundle.
///
/// In-memory fields use snake case; `dict()` injects the legacy `"class"`
/// discriminator the backend needs, and `from_dict` ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgpRoute {
    pub network: String,
    #[serde(default)]
    pub as_path: Vec<Vec<i64>>,
    #[serde(default)]
    pub communities: Vec<String>,
    #[serde(default)]
    pub local_preference: i64,
    #[serde(default)]
    pub metric: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_protocol: Option<String>,
    #[serde(default)]
    pub tag: i64,
    #[serde(default)]
    pub weight: i64,
}

impl DataModelElement for BgpRoute {
    const NAME: &'static str = "BgpRoute";

    fn dict(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.insert("class".to_string(), Value::String(BGP_ROUTE_CLASS.into()));
        }
        value
    }
}

impl std::fmt::Display for BgpRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "BgpRoute<{}>", self.network)?;
        writeln!(f, "  asPath: {:?}", self.as_path)?;
        writeln!(f, "  communities: {:?}", self.communities)?;
        writeln!(f, "  localPreference: {}", self.local_preference)?;
        write!(f, "  metric: {}", self.metric)
    }
}

/// One changed attribute between a reference and a current [`BgpRoute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgpRouteDiff {
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
}

impl DataModelElement for BgpRouteDiff {
    const NAME: &'static str = "BgpRouteDiff";
}

impl std::fmt::Display for BgpRouteDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.field_name, self.old_value, self.new_value
        )
    }
}

/// The set of attribute changes between two versions of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpRouteDiffs {
    #[serde(default)]
    pub diffs: Vec<BgpRouteDiff>,
}

impl DataModelElement for BgpRouteDiffs {
    const NAME: &'static str = "BgpRouteDiffs";
}

impl std::fmt::Display for BgpRouteDiffs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.diffs.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_hop_discard_roundtrip() {
        let nh = NextHop::from_dict(&json!({"type": "discard"})).unwrap();
        assert_eq!(nh, NextHop::Discard);
        assert_eq!(NextHop::from_dict(&nh.dict()).unwrap(), nh);
        assert_eq!(nh.to_string(), "discard");
    }

    #[test]
    fn test_next_hop_interface_roundtrip() {
        let nh =
            NextHop::from_dict(&json!({"type": "interface", "interface": "eth0"})).unwrap();
        assert_eq!(
            nh,
            NextHop::Interface {
                interface: "eth0".into(),
                ip: None
            }
        );
        assert_eq!(NextHop::from_dict(&nh.dict()).unwrap(), nh);
    }

    #[test]
    fn test_next_hop_ip_roundtrip() {
        let nh = NextHop::from_dict(&json!({"type": "ip", "ip": "10.0.0.1"})).unwrap();
        assert_eq!(NextHop::from_dict(&nh.dict()).unwrap(), nh);
        assert_eq!(nh.to_string(), "ip 10.0.0.1");
    }

    #[test]
    fn test_next_hop_vrf_roundtrip() {
        let nh = NextHop::from_dict(&json!({"type": "vrf", "vrf": "mgmt"})).unwrap();
        assert_eq!(NextHop::from_dict(&nh.dict()).unwrap(), nh);
    }

    #[test]
    fn test_next_hop_vtep_roundtrip() {
        let nh = NextHop::from_dict(&json!({"type": "vtep", "vni": 5, "vtep": "1.2.3.4"}))
            .unwrap();
        assert_eq!(NextHop::from_dict(&nh.dict()).unwrap(), nh);
        assert_eq!(nh.to_string(), "vni 5 vtep 1.2.3.4");
    }

    #[test]
    fn test_next_hop_unknown_type_is_error() {
        let err = NextHop::from_dict(&json!({"type": "teleport", "ip": "1.2.3.4"})).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn test_next_hop_missing_type_is_error() {
        let err = NextHop::from_dict(&json!({"ip": "1.2.3.4"})).unwrap_err();
        assert!(err.to_string().contains("Unrecognized next hop"));
    }

    #[test]
    fn test_bgp_route_dict_injects_class() {
        let route = BgpRoute::from_dict(&json!({
            "network": "10.0.0.0/24",
            "asPath": [[65001], [65002]],
            "communities": ["65001:100"],
            "localPreference": 100,
            "metric": 10
        }))
        .unwrap();
        let d = route.dict();
        assert_eq!(d["class"], BGP_ROUTE_CLASS);
        // from_dict tolerates the injected discriminator
        assert_eq!(BgpRoute::from_dict(&d).unwrap(), route);
    }

    #[test]
    fn test_bgp_route_diffs_display() {
        let diffs = BgpRouteDiffs {
            diffs: vec![BgpRouteDiff {
                field_name: "localPreference".into(),
                old_value: "100".into(),
                new_value: "200".into(),
            }],
        };
        assert_eq!(diffs.to_string(), "localPreference: 100 -> 200");
        assert_eq!(BgpRouteDiffs::from_dict(&diffs.dict()).unwrap(), diffs);
    }
}
