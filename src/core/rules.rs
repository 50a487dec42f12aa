//! Firewall policy data structures
//!
//! This module defines the abstract records an operator edits (packet-filter
//! rules, NAT rules, global toggles, interface/zone metadata) plus the
//! derived and historical types (traffic counters, ruleset snapshots).
//!
//! Records never carry raw iptables syntax. Translation to engine-native text
//! happens in [`crate::core::ruleset`], and only through the sanitizers in
//! [`crate::validators`].
//!
//! # Ordering
//!
//! `position` plus `created_at` defines the total order rules are applied in:
//! lower positions first, creation time breaking ties. The store's `list`
//! operations return records already sorted this way.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of rules accepted in a single ruleset
///
/// Limit prevents memory exhaustion from malformed or malicious stores.
/// Real deployments sit well under 100 rules.
pub const MAX_RULES: usize = 1000;

/// Builtin filter-table chain a rule attaches to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Chain {
    #[strum(serialize = "INPUT")]
    #[serde(rename = "INPUT")]
    Input,
    #[strum(serialize = "OUTPUT")]
    #[serde(rename = "OUTPUT")]
    Output,
    #[strum(serialize = "FORWARD")]
    #[serde(rename = "FORWARD")]
    Forward,
}

impl Chain {
    /// Returns the iptables chain name as a static string
    pub const fn as_str(self) -> &'static str {
        match self {
            Chain::Input => "INPUT",
            Chain::Output => "OUTPUT",
            Chain::Forward => "FORWARD",
        }
    }
}

/// Network protocol matched by a rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    #[strum(serialize = "icmp")]
    Icmp,
    /// Match every protocol; no `-p` clause is emitted
    #[default]
    #[strum(serialize = "all")]
    All,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::All => "all",
        }
    }

    /// Whether `--sport`/`--dport` clauses are meaningful for this protocol
    pub const fn carries_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

/// Terminal action for a matching packet
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Action {
    #[strum(serialize = "ACCEPT")]
    #[serde(rename = "ACCEPT")]
    Accept,
    #[strum(serialize = "DROP")]
    #[serde(rename = "DROP")]
    Drop,
    #[strum(serialize = "REJECT")]
    #[serde(rename = "REJECT")]
    Reject,
    #[strum(serialize = "LOG")]
    #[serde(rename = "LOG")]
    Log,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Accept => "ACCEPT",
            Action::Drop => "DROP",
            Action::Reject => "REJECT",
            Action::Log => "LOG",
        }
    }
}

/// NAT rewrite direction
///
/// The chain mapping is fixed: source rewriting happens after routing,
/// destination rewriting before it.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum NatKind {
    #[strum(serialize = "SNAT")]
    #[serde(rename = "SNAT")]
    Snat,
    #[strum(serialize = "DNAT")]
    #[serde(rename = "DNAT")]
    Dnat,
}

impl NatKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            NatKind::Snat => "SNAT",
            NatKind::Dnat => "DNAT",
        }
    }

    /// NAT-table chain this kind renders into
    pub const fn chain(self) -> &'static str {
        match self {
            NatKind::Snat => "POSTROUTING",
            NatKind::Dnat => "PREROUTING",
        }
    }
}

/// A packet-filter rule
///
/// String match fields (`src`, `dst`, ports, comment) hold operator input
/// as entered; empty means "any". They are sanitized at build time, never
/// trusted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub id: Uuid,
    pub chain: Chain,
    #[serde(default)]
    pub protocol: Protocol,
    /// Source CIDR or empty for any
    #[serde(default)]
    pub src: String,
    /// Destination CIDR or empty for any
    #[serde(default)]
    pub dst: String,
    /// Single port or range "lo:hi", empty for any
    #[serde(default)]
    pub src_port: String,
    #[serde(default)]
    pub dst_port: String,
    pub action: Action,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub position: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A network address translation rule
///
/// A NAT rule without a resolvable rewrite target (`nat_to_ip`) is dropped
/// from the built ruleset with a warning; it is never a hard failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NatRule {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub kind: NatKind,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub in_interface: String,
    #[serde(default)]
    pub out_interface: String,
    #[serde(default)]
    pub source_ip: String,
    #[serde(default)]
    pub source_port: String,
    #[serde(default)]
    pub dest_ip: String,
    #[serde(default)]
    pub dest_port: String,
    /// Rewrite target address; required for the rule to be emittable
    #[serde(default)]
    pub nat_to_ip: String,
    #[serde(default)]
    pub nat_to_port: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub position: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Global firewall toggles
///
/// Singleton record: lazily created with defaults on first read, upserted
/// in place afterwards, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallConfig {
    pub id: Uuid,
    #[serde(default)]
    pub ip_forwarding: bool,
    #[serde(default)]
    pub nat_enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl FirewallConfig {
    /// Default config used when no record exists yet
    pub fn new_default() -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            ip_forwarding: false,
            nat_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A physical or virtual network interface known to the operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterface {
    pub id: Uuid,
    /// Kernel interface name, e.g. eth0
    pub name: String,
    /// Zone this interface belongs to, e.g. public, dmz
    #[serde(default)]
    pub zone: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub notes: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A named trust zone grouping interfaces
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Default target for unmatched traffic in this zone
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub in_policy: String,
    #[serde(default)]
    pub out_policy: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Traffic counter for one chain policy or one rule
///
/// Derived from the live engine dump on every read; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counter {
    /// Chain the counter was observed under
    pub chain: String,
    /// The literal string "policy" for a chain's default-policy counter,
    /// otherwise the rule text as dumped by the engine
    pub rule: String,
    pub packets: u64,
    pub bytes: u64,
}

/// A captured engine snapshot used as a rollback point
///
/// `snapshot` is raw iptables-save output from a prior successful dump:
/// trusted engine text, not user input. Append-only; rollback reads but
/// never mutates history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub snapshot: String,
    #[serde(default)]
    pub description: String,
    /// SHA-256 hex digest of `snapshot`, verified before rollback
    #[serde(default)]
    pub checksum: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

fn default_true() -> bool {
    true
}
