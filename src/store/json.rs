//! JSON-backed policy store
//!
//! Policy records live in one JSON document rewritten atomically on every
//! mutation:
//!
//! 1. Serialize the whole document to `policy.json.tmp`.
//! 2. Create the file with mode 0o600 before any data is written.
//! 3. `fsync`, then atomically rename over `policy.json`.
//!
//! History is different: snapshots are append-only, so they go to a
//! JSON-lines file (`history.jsonl`) with one entry per line, synced after
//! each append.
//!
//! A `tokio::sync::RwLock` around the in-memory document makes the store
//! single-writer; reads share the lock concurrently.

use crate::core::error::{Error, Result};
use crate::core::rules::{
    FirewallConfig, HistoryEntry, NatRule, NetworkInterface, Rule, Zone,
};
use crate::store::{
    ConfigStore, HistoryStore, InterfaceStore, NatRuleStore, RuleStore, ZoneStore,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

const POLICY_FILE: &str = "policy.json";
const HISTORY_FILE: &str = "history.jsonl";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    rules: Vec<Rule>,
    #[serde(default)]
    nat_rules: Vec<NatRule>,
    #[serde(default)]
    config: Option<FirewallConfig>,
    #[serde(default)]
    interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    zones: Vec<Zone>,
}

/// Policy store persisting to a single JSON document
pub struct JsonStore {
    path: PathBuf,
    doc: RwLock<Document>,
}

impl JsonStore {
    /// Opens (or initializes) the store in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if an existing document cannot be read or parsed;
    /// a corrupt policy file must be surfaced, not silently replaced.
    pub async fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(POLICY_FILE);
        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Writes the document atomically: tmp file with 0o600, fsync, rename.
    async fn persist(&self, doc: &Document) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let tmp_path = self.path.with_extension("json.tmp");

        #[cfg(unix)]
        {
            use tokio::fs::OpenOptions;

            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .mode(0o600) // Set permissions BEFORE any data is written
                .open(&tmp_path)
                .await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }

        #[cfg(not(unix))]
        {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }

        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Sorts records into apply order: position ascending, creation time
/// breaking ties.
fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

fn sort_nat_rules(rules: &mut [NatRule]) {
    rules.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

#[async_trait]
impl RuleStore for JsonStore {
    async fn list(&self) -> Result<Vec<Rule>> {
        let doc = self.doc.read().await;
        let mut rules = doc.rules.clone();
        sort_rules(&mut rules);
        Ok(rules)
    }

    async fn get(&self, id: Uuid) -> Result<Rule> {
        let doc = self.doc.read().await;
        doc.rules
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "rule",
                id: id.to_string(),
            })
    }

    async fn create(&self, rule: Rule) -> Result<()> {
        let mut doc = self.doc.write().await;
        doc.rules.push(rule);
        self.persist(&doc).await
    }

    async fn update(&self, rule: Rule) -> Result<()> {
        let mut doc = self.doc.write().await;
        let slot = doc
            .rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| Error::NotFound {
                kind: "rule",
                id: rule.id.to_string(),
            })?;
        *slot = rule;
        self.persist(&doc).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut doc = self.doc.write().await;
        let before = doc.rules.len();
        doc.rules.retain(|r| r.id != id);
        if doc.rules.len() == before {
            return Err(Error::NotFound {
                kind: "rule",
                id: id.to_string(),
            });
        }
        self.persist(&doc).await
    }
}

#[async_trait]
impl NatRuleStore for JsonStore {
    async fn list(&self) -> Result<Vec<NatRule>> {
        let doc = self.doc.read().await;
        let mut rules = doc.nat_rules.clone();
        sort_nat_rules(&mut rules);
        Ok(rules)
    }

    async fn get(&self, id: Uuid) -> Result<NatRule> {
        let doc = self.doc.read().await;
        doc.nat_rules
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "nat rule",
                id: id.to_string(),
            })
    }

    async fn create(&self, rule: NatRule) -> Result<()> {
        let mut doc = self.doc.write().await;
        doc.nat_rules.push(rule);
        self.persist(&doc).await
    }

    async fn update(&self, rule: NatRule) -> Result<()> {
        let mut doc = self.doc.write().await;
        let slot = doc
            .nat_rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| Error::NotFound {
                kind: "nat rule",
                id: rule.id.to_string(),
            })?;
        *slot = rule;
        self.persist(&doc).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut doc = self.doc.write().await;
        let before = doc.nat_rules.len();
        doc.nat_rules.retain(|r| r.id != id);
        if doc.nat_rules.len() == before {
            return Err(Error::NotFound {
                kind: "nat rule",
                id: id.to_string(),
            });
        }
        self.persist(&doc).await
    }
}

#[async_trait]
impl ConfigStore for JsonStore {
    async fn get_or_default(&self) -> Result<FirewallConfig> {
        {
            let doc = self.doc.read().await;
            if let Some(config) = &doc.config {
                return Ok(config.clone());
            }
        }
        // Lazily create the singleton on first read
        let mut doc = self.doc.write().await;
        if let Some(config) = &doc.config {
            return Ok(config.clone());
        }
        let config = FirewallConfig::new_default();
        doc.config = Some(config.clone());
        self.persist(&doc).await?;
        Ok(config)
    }

    async fn update(&self, mut config: FirewallConfig) -> Result<()> {
        let mut doc = self.doc.write().await;
        config.updated_at = chrono::Utc::now();
        doc.config = Some(config);
        self.persist(&doc).await
    }
}

#[async_trait]
impl InterfaceStore for JsonStore {
    async fn list(&self) -> Result<Vec<NetworkInterface>> {
        let doc = self.doc.read().await;
        let mut interfaces = doc.interfaces.clone();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(interfaces)
    }

    async fn get(&self, id: Uuid) -> Result<NetworkInterface> {
        let doc = self.doc.read().await;
        doc.interfaces
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "interface",
                id: id.to_string(),
            })
    }

    async fn create(&self, iface: NetworkInterface) -> Result<()> {
        let mut doc = self.doc.write().await;
        doc.interfaces.push(iface);
        self.persist(&doc).await
    }

    async fn update(&self, iface: NetworkInterface) -> Result<()> {
        let mut doc = self.doc.write().await;
        let slot = doc
            .interfaces
            .iter_mut()
            .find(|i| i.id == iface.id)
            .ok_or_else(|| Error::NotFound {
                kind: "interface",
                id: iface.id.to_string(),
            })?;
        *slot = iface;
        self.persist(&doc).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut doc = self.doc.write().await;
        let before = doc.interfaces.len();
        doc.interfaces.retain(|i| i.id != id);
        if doc.interfaces.len() == before {
            return Err(Error::NotFound {
                kind: "interface",
                id: id.to_string(),
            });
        }
        self.persist(&doc).await
    }
}

#[async_trait]
impl ZoneStore for JsonStore {
    async fn list(&self) -> Result<Vec<Zone>> {
        let doc = self.doc.read().await;
        let mut zones = doc.zones.clone();
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(zones)
    }

    async fn get(&self, id: Uuid) -> Result<Zone> {
        let doc = self.doc.read().await;
        doc.zones
            .iter()
            .find(|z| z.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "zone",
                id: id.to_string(),
            })
    }

    async fn create(&self, zone: Zone) -> Result<()> {
        let mut doc = self.doc.write().await;
        doc.zones.push(zone);
        self.persist(&doc).await
    }

    async fn update(&self, zone: Zone) -> Result<()> {
        let mut doc = self.doc.write().await;
        let slot = doc
            .zones
            .iter_mut()
            .find(|z| z.id == zone.id)
            .ok_or_else(|| Error::NotFound {
                kind: "zone",
                id: zone.id.to_string(),
            })?;
        *slot = zone;
        self.persist(&doc).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut doc = self.doc.write().await;
        let before = doc.zones.len();
        doc.zones.retain(|z| z.id != id);
        if doc.zones.len() == before {
            return Err(Error::NotFound {
                kind: "zone",
                id: id.to_string(),
            });
        }
        self.persist(&doc).await
    }
}

/// Append-only history log, one JSON entry per line
pub struct JsonHistoryStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonHistoryStore {
    pub fn open(dir: &Path) -> Self {
        Self {
            path: dir.join(HISTORY_FILE),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        // Tolerate a torn trailing line from a crashed writer
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn save(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_string(&entry)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path).await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn latest(&self) -> Result<HistoryEntry> {
        self.read_all()
            .await?
            .into_iter()
            .max_by_key(|e| e.applied_at)
            .ok_or(Error::NoSnapshot)
    }

    async fn list(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all().await?;
        entries.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        entries.truncate(limit);
        Ok(entries)
    }
}
