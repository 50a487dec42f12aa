//! Translation of policy records into iptables-restore transaction blocks
//!
//! This is the only place engine-native rule syntax is produced. Each block
//! is a complete, syntactically closed transaction: table header, default
//! chain policies, one `-A` line per enabled buildable record in input
//! order, and a terminating `COMMIT`.
//!
//! Lines are assembled through [`RuleLine`], which accepts only static
//! syntax tokens, closed enums, and the `Safe*` values minted by
//! [`crate::validators`]. There is no way to push a raw operator string
//! into a line.
//!
//! Clause order is fixed: interfaces → protocol → source → destination →
//! source port → destination port → comment → target. Building the same
//! record set twice yields byte-identical output.

use crate::core::rules::{Action, NatKind, NatRule, Protocol, Rule, MAX_RULES};
use crate::validators::{
    sanitize_cidr, sanitize_comment, sanitize_interface, sanitize_port, SafeCidr, SafeComment,
    SafeInterface, SafePort,
};
use tracing::warn;

/// One engine-native append line under construction
///
/// Tokens are joined with single spaces on [`RuleLine::finish`]. All `push`
/// methods take either `&'static str` syntax or sanitizer-minted values.
struct RuleLine {
    parts: Vec<String>,
}

impl RuleLine {
    fn append_to(chain: &'static str) -> Self {
        Self {
            parts: vec!["-A".to_string(), chain.to_string()],
        }
    }

    fn interface(mut self, flag: &'static str, value: &SafeInterface) -> Self {
        self.parts.push(flag.to_string());
        self.parts.push(value.as_str().to_string());
        self
    }

    fn protocol(mut self, protocol: Protocol) -> Self {
        // "all" matches everything; the clause would be noise
        if protocol != Protocol::All {
            self.parts.push("-p".to_string());
            self.parts.push(protocol.as_str().to_string());
        }
        self
    }

    fn cidr(mut self, flag: &'static str, value: &SafeCidr) -> Self {
        self.parts.push(flag.to_string());
        self.parts.push(value.as_str().to_string());
        self
    }

    fn port(mut self, flag: &'static str, value: &SafePort) -> Self {
        self.parts.push(flag.to_string());
        self.parts.push(value.as_str().to_string());
        self
    }

    fn comment(mut self, value: &SafeComment) -> Self {
        self.parts.push("-m".to_string());
        self.parts.push("comment".to_string());
        self.parts.push("--comment".to_string());
        self.parts.push(value.as_str().to_string());
        self
    }

    fn jump(mut self, action: Action) -> String {
        self.parts.push("-j".to_string());
        self.parts.push(action.as_str().to_string());
        self.finish()
    }

    fn jump_nat(mut self, kind: NatKind, target: &str) -> String {
        self.parts.push("-j".to_string());
        self.parts.push(kind.as_str().to_string());
        self.parts.push(format!("--to-destination={target}"));
        self.finish()
    }

    fn finish(self) -> String {
        self.parts.join(" ")
    }
}

/// Builds the complete filter-table transaction block.
///
/// Policies are `INPUT ACCEPT`, `FORWARD DROP`, `OUTPUT ACCEPT`: forwarded
/// traffic is denied unless explicitly allowed, host traffic is governed by
/// the explicit rule list.
pub fn build_filter_ruleset(rules: &[Rule]) -> String {
    let mut out = String::from("*filter\n");
    out.push_str(":INPUT ACCEPT [0:0]\n");
    out.push_str(":FORWARD DROP [0:0]\n");
    out.push_str(":OUTPUT ACCEPT [0:0]\n");

    if rules.len() > MAX_RULES {
        warn!(
            count = rules.len(),
            max = MAX_RULES,
            "rule set exceeds limit, excess rules ignored"
        );
    }

    for rule in rules.iter().take(MAX_RULES) {
        if !rule.enabled {
            continue;
        }
        out.push_str(&filter_rule_line(rule));
        out.push('\n');
    }

    out.push_str("COMMIT\n");
    out
}

/// Builds the complete nat-table transaction block.
///
/// All four NAT chains default to ACCEPT: the nat table only redirects
/// traffic, it never gates it. Callers must not invoke this with an empty
/// record set; the engine driver flushes the table instead.
pub fn build_nat_ruleset(nat_rules: &[NatRule]) -> String {
    let mut out = String::from("*nat\n");
    out.push_str(":PREROUTING ACCEPT [0:0]\n");
    out.push_str(":INPUT ACCEPT [0:0]\n");
    out.push_str(":OUTPUT ACCEPT [0:0]\n");
    out.push_str(":POSTROUTING ACCEPT [0:0]\n");

    for rule in nat_rules.iter().take(MAX_RULES) {
        if !rule.enabled {
            continue;
        }
        if let Some(line) = nat_rule_line(rule) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    out.push_str("COMMIT\n");
    out
}

/// Renders one filter rule into an append line.
///
/// Every match clause degrades independently: a field that fails its
/// sanitizer is omitted rather than failing the build. Port clauses are
/// only emitted for port-bearing protocols.
fn filter_rule_line(rule: &Rule) -> String {
    let mut line = RuleLine::append_to(rule.chain.as_str()).protocol(rule.protocol);

    if let Some(src) = sanitize_cidr(&rule.src) {
        line = line.cidr("-s", &src);
    }
    if let Some(dst) = sanitize_cidr(&rule.dst) {
        line = line.cidr("-d", &dst);
    }
    if rule.protocol.carries_ports() {
        if let Some(sport) = sanitize_port(&rule.src_port) {
            line = line.port("--sport", &sport);
        }
        if let Some(dport) = sanitize_port(&rule.dst_port) {
            line = line.port("--dport", &dport);
        }
    }
    if let Some(comment) = sanitize_comment(&rule.comment) {
        line = line.comment(&comment);
    }

    line.jump(rule.action)
}

/// Renders one NAT rule into an append line, or nothing.
///
/// The rewrite target is the one field with no safe fallback: if
/// `nat_to_ip` does not sanitize, the whole rule is dropped with a warning
/// carrying the record identity. Everything else degrades clause by clause.
fn nat_rule_line(rule: &NatRule) -> Option<String> {
    let Some(target_ip) = sanitize_cidr(&rule.nat_to_ip) else {
        warn!(rule_id = %rule.id, kind = rule.kind.as_str(), "NAT rule missing rewrite target, skipping");
        return None;
    };

    let mut line = RuleLine::append_to(rule.kind.chain());

    if let Some(iface) = sanitize_interface(&rule.in_interface) {
        line = line.interface("-i", &iface);
    }
    if let Some(iface) = sanitize_interface(&rule.out_interface) {
        line = line.interface("-o", &iface);
    }
    line = line.protocol(rule.protocol);
    if let Some(src) = sanitize_cidr(&rule.source_ip) {
        line = line.cidr("-s", &src);
    }
    if let Some(dst) = sanitize_cidr(&rule.dest_ip) {
        line = line.cidr("-d", &dst);
    }
    if rule.protocol.carries_ports() {
        if let Some(sport) = sanitize_port(&rule.source_port) {
            line = line.port("--sport", &sport);
        }
        if let Some(dport) = sanitize_port(&rule.dest_port) {
            line = line.port("--dport", &dport);
        }
    }
    if let Some(comment) = sanitize_comment(&rule.comment) {
        line = line.comment(&comment);
    }

    let target = match sanitize_port(&rule.nat_to_port) {
        Some(port) => format!("{}:{}", target_ip.as_str(), port.as_str()),
        None => target_ip.as_str().to_string(),
    };

    Some(line.jump_nat(rule.kind, &target))
}
