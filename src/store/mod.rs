//! Durable policy storage
//!
//! The orchestrator depends on the trait seams here, never on a concrete
//! backend. The backing store is single-writer: mutations serialize behind
//! one writer lock while reads proceed concurrently.
//!
//! - [`json`]: JSON-document store with atomic writes, plus an append-only
//!   JSON-lines history log

use crate::core::error::Result;
use crate::core::rules::{
    FirewallConfig, HistoryEntry, NatRule, NetworkInterface, Rule, Zone,
};
use async_trait::async_trait;
use uuid::Uuid;

pub mod json;

/// Packet-filter rule records
///
/// `list` returns rules in apply order: position ascending, creation time
/// breaking ties.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Rule>>;
    async fn get(&self, id: Uuid) -> Result<Rule>;
    async fn create(&self, rule: Rule) -> Result<()>;
    async fn update(&self, rule: Rule) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// NAT rule records, ordered like [`RuleStore::list`]
#[async_trait]
pub trait NatRuleStore: Send + Sync {
    async fn list(&self) -> Result<Vec<NatRule>>;
    async fn get(&self, id: Uuid) -> Result<NatRule>;
    async fn create(&self, rule: NatRule) -> Result<()>;
    async fn update(&self, rule: NatRule) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Singleton global-toggle record
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the config, creating it with defaults on first read
    async fn get_or_default(&self) -> Result<FirewallConfig>;
    async fn update(&self, config: FirewallConfig) -> Result<()>;
}

/// Interface metadata records
#[async_trait]
pub trait InterfaceStore: Send + Sync {
    async fn list(&self) -> Result<Vec<NetworkInterface>>;
    async fn get(&self, id: Uuid) -> Result<NetworkInterface>;
    async fn create(&self, iface: NetworkInterface) -> Result<()>;
    async fn update(&self, iface: NetworkInterface) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Zone metadata records
#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Zone>>;
    async fn get(&self, id: Uuid) -> Result<Zone>;
    async fn create(&self, zone: Zone) -> Result<()>;
    async fn update(&self, zone: Zone) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Append-only snapshot history
///
/// Owned by the apply orchestrator; rollback reads but never mutates.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save(&self, entry: HistoryEntry) -> Result<()>;
    /// Most recent entry, or [`crate::core::error::Error::NoSnapshot`]
    async fn latest(&self) -> Result<HistoryEntry>;
    /// Up to `limit` entries, newest first
    async fn list(&self, limit: usize) -> Result<Vec<HistoryEntry>>;
}
