//! Flows and the constraints used to search for them.

use serde::{Deserialize, Serialize};

use crate::primitives::DataModelElement;

/// Protocols for which a port number is meaningful in renderings.
const PORT_PROTOCOLS: [&str; 4] = ["TCP", "UDP", "DCCP", "SCTP"];

/// A concrete packet header as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub ingress_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_vrf: Option<String>,
    pub src_ip: String,
    pub dst_ip: String,
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<i64>,
    #[serde(default)]
    pub dscp: i64,
    #[serde(default)]
    pub ecn: i64,
    #[serde(default)]
    pub fragment_offset: i64,
    #[serde(default)]
    pub packet_length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp_code: Option<i64>,
    #[serde(default)]
    pub tcp_flags_ack: i64,
    #[serde(default)]
    pub tcp_flags_cwr: i64,
    #[serde(default)]
    pub tcp_flags_ece: i64,
    #[serde(default)]
    pub tcp_flags_fin: i64,
    #[serde(default)]
    pub tcp_flags_psh: i64,
    #[serde(default)]
    pub tcp_flags_rst: i64,
    #[serde(default)]
    pub tcp_flags_syn: i64,
    #[serde(default)]
    pub tcp_flags_urg: i64,
}

impl DataModelElement for Flow {
    const NAME: &'static str = "Flow";
}

impl Flow {
    /// Human-readable protocol: named protocols render as their name,
    /// unnamed ones as `ipProtocol=<number>`.
    pub fn get_ip_protocol_str(&self) -> String {
        match self.ip_protocol.strip_prefix("UNNAMED_") {
            Some(number) => format!("ipProtocol={}", number),
            None => self.ip_protocol.clone(),
        }
    }

    fn has_ports(&self) -> bool {
        PORT_PROTOCOLS.contains(&self.ip_protocol.as_str())
    }

    fn end_point(&self, ip: &str, port: Option<i64>) -> String {
        match port {
            Some(port) if self.has_ports() => format!("{}:{}", ip, port),
            _ => ip.to_string(),
        }
    }

    fn tcp_flags_str(&self) -> String {
        let named = [
            (self.tcp_flags_syn, "SYN"),
            (self.tcp_flags_ack, "ACK"),
            (self.tcp_flags_fin, "FIN"),
            (self.tcp_flags_rst, "RST"),
            (self.tcp_flags_psh, "PSH"),
            (self.tcp_flags_urg, "URG"),
            (self.tcp_flags_ece, "ECE"),
            (self.tcp_flags_cwr, "CWR"),
        ];
        named
            .iter()
            .filter(|(set, _)| *set != 0)
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for Flow {
    /// Best-effort summary. Zero-valued optional fields (dscp, ecn,
    /// fragment offset) are omitted to reduce noise.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "start={}", self.ingress_node)?;
        if let Some(iface) = &self.ingress_interface {
            write!(f, " interface={}", iface)?;
        }
        if let Some(vrf) = &self.ingress_vrf {
            if vrf != "default" {
                write!(f, " vrf={}", vrf)?;
            }
        }
        write!(
            f,
            " [{}->{} {}",
            self.end_point(&self.src_ip, self.src_port),
            self.end_point(&self.dst_ip, self.dst_port),
            self.get_ip_protocol_str()
        )?;
        if self.ip_protocol == "TCP" {
            let flags = self.tcp_flags_str();
            if !flags.is_empty() {
                write!(f, " ({})", flags)?;
            }
        }
        if self.ip_protocol.starts_with("ICMP") {
            if let Some(icmp_type) = self.icmp_type {
                write!(f, " type={}", icmp_type)?;
            }
            if let Some(icmp_code) = self.icmp_code {
                write!(f, " code={}", icmp_code)?;
            }
        }
        if self.packet_length != 0 {
            write!(f, " length={}", self.packet_length)?;
        }
        if self.dscp != 0 {
            write!(f, " dscp={}", self.dscp)?;
        }
        if self.ecn != 0 {
            write!(f, " ecn={}", self.ecn)?;
        }
        if self.fragment_offset != 0 {
            write!(f, " fragmentOffset={}", self.fragment_offset)?;
        }
        write!(f, "]")
    }
}

/// TCP flag bits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpFlags {
    #[serde(default)]
    pub ack: bool,
    #[serde(default)]
    pub cwr: bool,
    #[serde(default)]
    pub ece: bool,
    #[serde(default)]
    pub fin: bool,
    #[serde(default)]
    pub psh: bool,
    #[serde(default)]
    pub rst: bool,
    #[serde(default)]
    pub syn: bool,
    #[serde(default)]
    pub urg: bool,
}

/// Matches TCP flags: `use_*` selects which bits participate, `tcp_flags`
/// gives the values they must have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTcpFlags {
    #[serde(default)]
    pub tcp_flags: TcpFlags,
    #[serde(default)]
    pub use_ack: bool,
    #[serde(default)]
    pub use_cwr: bool,
    #[serde(default)]
    pub use_ece: bool,
    #[serde(default)]
    pub use_fin: bool,
    #[serde(default)]
    pub use_psh: bool,
    #[serde(default)]
    pub use_rst: bool,
    #[serde(default)]
    pub use_syn: bool,
    #[serde(default)]
    pub use_urg: bool,
}

impl MatchTcpFlags {
    /// Match packets with SYN set, everything else ignored.
    pub fn match_syn() -> Self {
        MatchTcpFlags {
            tcp_flags: TcpFlags {
                syn: true,
                ..TcpFlags::default()
            },
            use_syn: true,
            ..MatchTcpFlags::default()
        }
    }

    /// Match packets with SYN and ACK set, everything else ignored.
    pub fn match_synack() -> Self {
        MatchTcpFlags {
            tcp_flags: TcpFlags {
                syn: true,
                ack: true,
                ..TcpFlags::default()
            },
            use_syn: true,
            use_ack: true,
            ..MatchTcpFlags::default()
        }
    }
}

/// Accepts a single string or an iterable of strings for a header field.
///
/// Comma-joined fields (ports, DSCPs, ...) normalize at construction time via
/// [`FieldSpec::into_csv`]; list fields (protocols, applications) via
/// [`FieldSpec::into_list`].
pub trait FieldSpec {
    fn into_list(self) -> Vec<String>;

    fn into_csv(self) -> String
    where
        Self: Sized,
    {
        self.into_list().join(",")
    }
}

impl FieldSpec for &str {
    fn into_list(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl FieldSpec for String {
    fn into_list(self) -> Vec<String> {
        vec![self]
    }
}

impl<T: Into<String>> FieldSpec for Vec<T> {
    fn into_list(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<String>, const N: usize> FieldSpec for [T; N] {
    fn into_list(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Constraints on the packet header space the backend should search.
///
/// All fields are optional; an unset field is unconstrained. The
/// `firewall_classifications` field keeps its in-memory name and serializes
/// under the wire name `flowStates`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ips: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ips: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ports: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ports: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_protocols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp_codes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp_types: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dscps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_lengths: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_offsets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_flags: Option<Vec<MatchTcpFlags>>,
    #[serde(
        rename = "flowStates",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub firewall_classifications: Option<Vec<String>>,
}

impl DataModelElement for HeaderConstraints {
    const NAME: &'static str = "HeaderConstraints";
}

impl HeaderConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_ips(mut self, spec: impl FieldSpec) -> Self {
        self.src_ips = Some(spec.into_csv());
        self
    }

    pub fn dst_ips(mut self, spec: impl FieldSpec) -> Self {
        self.dst_ips = Some(spec.into_csv());
        self
    }

    pub fn src_ports(mut self, spec: impl FieldSpec) -> Self {
        self.src_ports = Some(spec.into_csv());
        self
    }

    pub fn dst_ports(mut self, spec: impl FieldSpec) -> Self {
        self.dst_ports = Some(spec.into_csv());
        self
    }

    pub fn ip_protocols(mut self, spec: impl FieldSpec) -> Self {
        self.ip_protocols = Some(spec.into_list());
        self
    }

    pub fn applications(mut self, spec: impl FieldSpec) -> Self {
        self.applications = Some(spec.into_list());
        self
    }

    pub fn icmp_codes(mut self, spec: impl FieldSpec) -> Self {
        self.icmp_codes = Some(spec.into_csv());
        self
    }

    pub fn icmp_types(mut self, spec: impl FieldSpec) -> Self {
        self.icmp_types = Some(spec.into_csv());
        self
    }

    pub fn dscps(mut self, spec: impl FieldSpec) -> Self {
        self.dscps = Some(spec.into_csv());
        self
    }

    pub fn ecns(mut self, spec: impl FieldSpec) -> Self {
        self.ecns = Some(spec.into_csv());
        self
    }

    pub fn packet_lengths(mut self, spec: impl FieldSpec) -> Self {
        self.packet_lengths = Some(spec.into_csv());
        self
    }

    pub fn fragment_offsets(mut self, spec: impl FieldSpec) -> Self {
        self.fragment_offsets = Some(spec.into_csv());
        self
    }

    pub fn tcp_flags(mut self, flags: Vec<MatchTcpFlags>) -> Self {
        self.tcp_flags = Some(flags);
        self
    }

    pub fn firewall_classifications(mut self, spec: impl FieldSpec) -> Self {
        self.firewall_classifications = Some(spec.into_list());
        self
    }
}

/// Constraints on the path a searched flow may take.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_locations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_locations: Option<String>,
}

impl DataModelElement for PathConstraints {
    const NAME: &'static str = "PathConstraints";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tcp_flow() -> Flow {
        Flow::from_dict(&json!({
            "ingressNode": "r1",
            "srcIp": "10.0.0.1",
            "dstIp": "10.0.0.2",
            "ipProtocol": "TCP",
            "srcPort": 49152,
            "dstPort": 80,
            "tcpFlagsSyn": 1,
            "packetLength": 512
        }))
        .unwrap()
    }

    #[test]
    fn test_ip_protocol_str_unnamed() {
        let mut flow = tcp_flow();
        flow.ip_protocol = "UNNAMED_243".into();
        assert_eq!(flow.get_ip_protocol_str(), "ipProtocol=243");
    }

    #[test]
    fn test_ip_protocol_str_named() {
        assert_eq!(tcp_flow().get_ip_protocol_str(), "TCP");
    }

    #[test]
    fn test_flow_display_tcp() {
        let rendered = tcp_flow().to_string();
        assert_eq!(
            rendered,
            "start=r1 [10.0.0.1:49152->10.0.0.2:80 TCP (SYN) length=512]"
        );
    }

    #[test]
    fn test_flow_display_omits_zero_fields() {
        let flow = Flow::from_dict(&json!({
            "ingressNode": "r1",
            "srcIp": "1.1.1.1",
            "dstIp": "2.2.2.2",
            "ipProtocol": "OSPF"
        }))
        .unwrap();
        let rendered = flow.to_string();
        assert!(!rendered.contains("dscp"));
        assert!(!rendered.contains("ecn"));
        assert!(!rendered.contains("fragmentOffset"));
        assert_eq!(rendered, "start=r1 [1.1.1.1->2.2.2.2 OSPF]");
    }

    #[test]
    fn test_flow_roundtrip() {
        let flow = tcp_flow();
        assert_eq!(Flow::from_dict(&flow.dict()).unwrap(), flow);
    }

    #[test]
    fn test_header_constraints_single_string() {
        let hc = HeaderConstraints::new().dst_ports("80");
        assert_eq!(hc.dst_ports.as_deref(), Some("80"));
    }

    #[test]
    fn test_header_constraints_list_joins() {
        let hc = HeaderConstraints::new()
            .dst_ports(["80", "443"])
            .ip_protocols(["tcp"]);
        assert_eq!(hc.dst_ports.as_deref(), Some("80,443"));
        assert_eq!(hc.ip_protocols, Some(vec!["tcp".to_string()]));
    }

    #[test]
    fn test_header_constraints_flow_states_rename() {
        let hc = HeaderConstraints::new().firewall_classifications(["ESTABLISHED"]);
        let d = hc.dict();
        assert!(d.get("flowStates").is_some());
        assert!(d.get("firewallClassifications").is_none());
        assert_eq!(HeaderConstraints::from_dict(&d).unwrap(), hc);
    }

    #[test]
    fn test_match_syn() {
        let m = MatchTcpFlags::match_syn();
        assert!(m.use_syn && m.tcp_flags.syn);
        assert!(!m.use_ack);
    }

    #[test]
    fn test_path_constraints_roundtrip() {
        let pc = PathConstraints {
            start_location: Some("r1".into()),
            ..PathConstraints::default()
        };
        assert_eq!(PathConstraints::from_dict(&pc.dict()).unwrap(), pc);
    }
}
