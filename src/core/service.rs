//! Apply/rollback orchestration
//!
//! [`FirewallService`] owns the sequencing of reads and writes across the
//! policy stores and the engine driver. An apply runs as one critical
//! section behind an async mutex:
//!
//! 1. Snapshot the live ruleset (best-effort: losing the rollback point
//!    is preferable to blocking policy updates).
//! 2. Fetch the rule set from storage.
//! 3. Atomically replace the filter table. Failure aborts everything.
//! 4. Best-effort secondary applies: scalar config, NAT table.
//! 5. Persist the snapshot as a history entry if one was captured.
//!
//! Secondary steps report through [`StepOutcome`]; soft failures become
//! warnings on the returned [`ApplyReport`] instead of logs-only, so a
//! caller can observe partial secondary state. The filter replace is the
//! single hard failure of the sequence.
//!
//! Rollback fetches the newest history entry, verifies its checksum, and
//! restores the raw text with no re-validation; the snapshot is trusted
//! engine output.

use crate::core::engine::Engine;
use crate::core::error::{Error, Result};
use crate::core::rules::{
    Action, Chain, Counter, FirewallConfig, HistoryEntry, NatKind, NatRule, Protocol, Rule,
};
use crate::store::{ConfigStore, HistoryStore, NatRuleStore, RuleStore};
use crate::validators::{validate_cidr, validate_interface, validate_port_spec};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of one orchestration sub-step
///
/// Soft failures are absorbed into the apply report; hard failures abort
/// the sequence. Modelling this explicitly keeps the best-effort/hard
/// branching in one place instead of scattered logged-and-ignored errors.
#[derive(Debug)]
pub enum StepOutcome {
    Ok,
    Soft(String),
    Hard(Error),
}

impl StepOutcome {
    /// Demotes any error to a soft failure with the given context label
    fn soft_from(context: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => StepOutcome::Ok,
            Err(e) => StepOutcome::Soft(format!("{context}: {e}")),
        }
    }
}

/// Result of a successful apply
///
/// `warnings` carries every absorbed soft failure (snapshot capture,
/// config/NAT pushes, history persistence). An apply that returns `Ok`
/// always has the filter table fully replaced; NAT and config state must
/// be judged from the warnings, never inferred from success alone.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub rule_count: usize,
    pub snapshot_captured: bool,
    pub warnings: Vec<String>,
}

/// Fields accepted when creating or updating a filter rule
#[derive(Debug, Clone)]
pub struct RuleDraft {
    pub chain: Chain,
    pub protocol: Protocol,
    pub src: String,
    pub dst: String,
    pub src_port: String,
    pub dst_port: String,
    pub action: Action,
    pub enabled: bool,
    pub comment: String,
    pub position: i32,
}

/// Fields accepted when creating or updating a NAT rule
#[derive(Debug, Clone)]
pub struct NatRuleDraft {
    pub name: String,
    pub kind: NatKind,
    pub protocol: Protocol,
    pub in_interface: String,
    pub out_interface: String,
    pub source_ip: String,
    pub source_port: String,
    pub dest_ip: String,
    pub dest_port: String,
    pub nat_to_ip: String,
    pub nat_to_port: String,
    pub comment: String,
    pub enabled: bool,
    pub position: i32,
}

pub struct FirewallService {
    rules: Arc<dyn RuleStore>,
    history: Arc<dyn HistoryStore>,
    engine: Arc<dyn Engine>,
    config: Option<Arc<dyn ConfigStore>>,
    nat_rules: Option<Arc<dyn NatRuleStore>>,
    /// Serializes apply/rollback so "snapshot → fetch → replace → persist"
    /// is one critical section
    apply_lock: Mutex<()>,
}

impl FirewallService {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        history: Arc<dyn HistoryStore>,
        engine: Arc<dyn Engine>,
    ) -> Self {
        Self {
            rules,
            history,
            engine,
            config: None,
            nat_rules: None,
            apply_lock: Mutex::new(()),
        }
    }

    /// Full constructor with the optional config and NAT collaborators
    pub fn with_config(
        rules: Arc<dyn RuleStore>,
        history: Arc<dyn HistoryStore>,
        config: Arc<dyn ConfigStore>,
        nat_rules: Arc<dyn NatRuleStore>,
        engine: Arc<dyn Engine>,
    ) -> Self {
        Self {
            rules,
            history,
            engine,
            config: Some(config),
            nat_rules: Some(nat_rules),
            apply_lock: Mutex::new(()),
        }
    }

    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        self.rules.list().await
    }

    pub async fn get_rule(&self, id: Uuid) -> Result<Rule> {
        self.rules.get(id).await
    }

    pub async fn create_rule(&self, draft: RuleDraft) -> Result<Rule> {
        validate_rule_draft(&draft)?;

        let now = chrono::Utc::now();
        let rule = Rule {
            id: Uuid::new_v4(),
            chain: draft.chain,
            protocol: draft.protocol,
            src: draft.src,
            dst: draft.dst,
            src_port: draft.src_port,
            dst_port: draft.dst_port,
            action: draft.action,
            enabled: draft.enabled,
            comment: draft.comment,
            position: draft.position,
            created_at: now,
            updated_at: now,
        };
        self.rules.create(rule.clone()).await?;

        info!(rule_id = %rule.id, "rule created");
        Ok(rule)
    }

    pub async fn update_rule(&self, id: Uuid, draft: RuleDraft) -> Result<Rule> {
        validate_rule_draft(&draft)?;

        let mut rule = self.rules.get(id).await?;
        rule.chain = draft.chain;
        rule.protocol = draft.protocol;
        rule.src = draft.src;
        rule.dst = draft.dst;
        rule.src_port = draft.src_port;
        rule.dst_port = draft.dst_port;
        rule.action = draft.action;
        rule.enabled = draft.enabled;
        rule.comment = draft.comment;
        rule.position = draft.position;
        rule.updated_at = chrono::Utc::now();
        self.rules.update(rule.clone()).await?;

        info!(rule_id = %id, "rule updated");
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: Uuid) -> Result<()> {
        self.rules.delete(id).await?;
        info!(rule_id = %id, "rule deleted");
        Ok(())
    }

    pub async fn list_nat_rules(&self) -> Result<Vec<NatRule>> {
        match &self.nat_rules {
            Some(store) => store.list().await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn create_nat_rule(&self, draft: NatRuleDraft) -> Result<NatRule> {
        let store = self
            .nat_rules
            .as_ref()
            .ok_or_else(|| Error::Internal("NAT store not configured".to_string()))?;
        validate_nat_draft(&draft)?;

        let now = chrono::Utc::now();
        let rule = NatRule {
            id: Uuid::new_v4(),
            name: draft.name,
            kind: draft.kind,
            protocol: draft.protocol,
            in_interface: draft.in_interface,
            out_interface: draft.out_interface,
            source_ip: draft.source_ip,
            source_port: draft.source_port,
            dest_ip: draft.dest_ip,
            dest_port: draft.dest_port,
            nat_to_ip: draft.nat_to_ip,
            nat_to_port: draft.nat_to_port,
            comment: draft.comment,
            enabled: draft.enabled,
            position: draft.position,
            created_at: now,
            updated_at: now,
        };
        store.create(rule.clone()).await?;

        info!(rule_id = %rule.id, kind = rule.kind.as_str(), "NAT rule created");
        Ok(rule)
    }

    pub async fn delete_nat_rule(&self, id: Uuid) -> Result<()> {
        let store = self
            .nat_rules
            .as_ref()
            .ok_or_else(|| Error::Internal("NAT store not configured".to_string()))?;
        store.delete(id).await?;
        info!(rule_id = %id, "NAT rule deleted");
        Ok(())
    }

    pub async fn get_config(&self) -> Result<FirewallConfig> {
        let store = self
            .config
            .as_ref()
            .ok_or_else(|| Error::Internal("config store not configured".to_string()))?;
        store.get_or_default().await
    }

    pub async fn update_config(
        &self,
        ip_forwarding: bool,
        nat_enabled: bool,
    ) -> Result<FirewallConfig> {
        let store = self
            .config
            .as_ref()
            .ok_or_else(|| Error::Internal("config store not configured".to_string()))?;
        let mut config = store.get_or_default().await?;
        config.ip_forwarding = ip_forwarding;
        config.nat_enabled = nat_enabled;
        store.update(config.clone()).await?;
        Ok(config)
    }

    /// Pushes the stored policy into the live engine.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the rule set cannot be loaded from storage
    /// or the filter-table replace fails; every other failure is absorbed
    /// into [`ApplyReport::warnings`].
    pub async fn apply_rules(&self) -> Result<ApplyReport> {
        let _guard = self.apply_lock.lock().await;
        let mut warnings = Vec::new();

        // Snapshot current live state before applying (for rollback).
        let snapshot = match self.engine.load().await {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => {
                warn!("pre-apply snapshot was empty, skipping history entry");
                warnings.push("snapshot skipped: live ruleset dump was empty".to_string());
                None
            }
            Err(e) => {
                warn!(error = %e, "could not snapshot current ruleset before apply");
                warnings.push(format!("snapshot skipped: {e}"));
                None
            }
        };

        let rules = self.rules.list().await?;

        // The one hard step: atomic filter-table replacement.
        self.engine.apply(&rules).await?;

        match self.apply_config_step().await {
            StepOutcome::Ok => {}
            StepOutcome::Soft(reason) => {
                warn!(reason = %reason, "secondary config apply failed");
                warnings.push(reason);
            }
            StepOutcome::Hard(e) => return Err(e),
        }

        match self.apply_nat_step().await {
            StepOutcome::Ok => {}
            StepOutcome::Soft(reason) => {
                warn!(reason = %reason, "secondary NAT apply failed");
                warnings.push(reason);
            }
            StepOutcome::Hard(e) => return Err(e),
        }

        let snapshot_captured = snapshot.is_some();
        if let Some(text) = snapshot {
            match self.persist_snapshot_step(text).await {
                StepOutcome::Ok => {}
                StepOutcome::Soft(reason) => {
                    warn!(reason = %reason, "could not save history entry");
                    warnings.push(reason);
                }
                StepOutcome::Hard(e) => return Err(e),
            }
        }

        info!(rule_count = rules.len(), "ruleset applied to kernel");
        Ok(ApplyReport {
            rule_count: rules.len(),
            snapshot_captured,
            warnings,
        })
    }

    /// Restores the most recent snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSnapshot`] when history is empty,
    /// [`Error::SnapshotIntegrity`] when the stored checksum does not
    /// match, or the engine error when the restore itself fails.
    pub async fn rollback(&self) -> Result<Uuid> {
        let _guard = self.apply_lock.lock().await;

        let entry = self.history.latest().await?;

        if !entry.checksum.is_empty() {
            let actual = snapshot_checksum(&entry.snapshot);
            if actual != entry.checksum {
                return Err(Error::SnapshotIntegrity {
                    expected: entry.checksum,
                    actual,
                });
            }
        }

        self.engine.restore_raw(&entry.snapshot).await?;

        info!(history_id = %entry.id, "rolled back to previous snapshot");
        Ok(entry.id)
    }

    /// Reads live traffic counters.
    pub async fn counters(&self) -> Result<Vec<Counter>> {
        self.engine.counters().await
    }

    /// Lists the most recent snapshots, newest first.
    pub async fn history_entries(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.history.list(limit).await
    }

    async fn apply_config_step(&self) -> StepOutcome {
        let Some(store) = &self.config else {
            return StepOutcome::Ok;
        };
        let config = match store.get_or_default().await {
            Ok(config) => config,
            Err(e) => return StepOutcome::Soft(format!("load firewall config: {e}")),
        };
        StepOutcome::soft_from("apply firewall config", self.engine.apply_config(&config).await)
    }

    async fn apply_nat_step(&self) -> StepOutcome {
        let Some(store) = &self.nat_rules else {
            return StepOutcome::Ok;
        };
        let nat_rules = match store.list().await {
            Ok(nat_rules) => nat_rules,
            Err(e) => return StepOutcome::Soft(format!("load NAT rules: {e}")),
        };
        StepOutcome::soft_from("apply NAT rules", self.engine.apply_nat(&nat_rules).await)
    }

    async fn persist_snapshot_step(&self, snapshot: String) -> StepOutcome {
        let now = chrono::Utc::now();
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            checksum: snapshot_checksum(&snapshot),
            snapshot,
            description: format!("snapshot before apply at {}", now.to_rfc3339()),
            applied_at: now,
        };
        StepOutcome::soft_from("save history entry", self.history.save(entry).await)
    }
}

/// SHA-256 hex digest of a snapshot text
pub fn snapshot_checksum(snapshot: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snapshot.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn validate_rule_draft(draft: &RuleDraft) -> Result<()> {
    validate_cidr(&draft.src).map_err(|m| Error::validation("src", m))?;
    validate_cidr(&draft.dst).map_err(|m| Error::validation("dst", m))?;
    validate_port_spec(&draft.src_port).map_err(|m| Error::validation("srcPort", m))?;
    validate_port_spec(&draft.dst_port).map_err(|m| Error::validation("dstPort", m))?;
    Ok(())
}

fn validate_nat_draft(draft: &NatRuleDraft) -> Result<()> {
    validate_cidr(&draft.source_ip).map_err(|m| Error::validation("sourceIP", m))?;
    validate_cidr(&draft.dest_ip).map_err(|m| Error::validation("destIP", m))?;
    validate_cidr(&draft.nat_to_ip).map_err(|m| Error::validation("natToIP", m))?;
    validate_port_spec(&draft.source_port).map_err(|m| Error::validation("sourcePort", m))?;
    validate_port_spec(&draft.dest_port).map_err(|m| Error::validation("destPort", m))?;
    validate_port_spec(&draft.nat_to_port).map_err(|m| Error::validation("natToPort", m))?;
    validate_interface(&draft.in_interface).map_err(|m| Error::validation("inInterface", m))?;
    validate_interface(&draft.out_interface).map_err(|m| Error::validation("outInterface", m))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::HistoryEntry;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// In-memory engine recording every mutating call
    #[derive(Default)]
    struct MockEngine {
        /// `None` makes `load` fail
        dump: StdMutex<Option<String>>,
        fail_apply: StdMutex<bool>,
        fail_nat: StdMutex<bool>,
        fail_config: StdMutex<bool>,
        applied: StdMutex<Vec<String>>,
    }

    impl MockEngine {
        fn new() -> Self {
            let engine = Self::default();
            *engine.dump.lock().unwrap() =
                Some("*filter\n:INPUT ACCEPT [0:0]\nCOMMIT\n".to_string());
            engine
        }

        fn with_dump_failure() -> Self {
            Self::default()
        }

        fn record(&self, event: impl Into<String>) {
            self.applied.lock().unwrap().push(event.into());
        }

        fn events(&self) -> Vec<String> {
            self.applied.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Engine for MockEngine {
        async fn load(&self) -> Result<String> {
            match self.dump.lock().unwrap().clone() {
                Some(text) => Ok(text),
                None => Err(Error::Internal("dump refused".to_string())),
            }
        }

        async fn apply(&self, rules: &[Rule]) -> Result<()> {
            if *self.fail_apply.lock().unwrap() {
                return Err(Error::Engine {
                    command: "iptables-restore".to_string(),
                    stderr: "bad filter".to_string(),
                    exit_code: Some(2),
                });
            }
            self.record(format!("apply:{}", rules.len()));
            Ok(())
        }

        async fn apply_nat(&self, nat_rules: &[NatRule]) -> Result<()> {
            if *self.fail_nat.lock().unwrap() {
                return Err(Error::Engine {
                    command: "iptables-restore".to_string(),
                    stderr: "bad nat".to_string(),
                    exit_code: Some(2),
                });
            }
            if nat_rules.is_empty() {
                self.record("nat:flush");
            } else {
                self.record(format!("nat:{}", nat_rules.len()));
            }
            Ok(())
        }

        async fn apply_config(&self, config: &FirewallConfig) -> Result<()> {
            if *self.fail_config.lock().unwrap() {
                return Err(Error::Internal("sysctl refused".to_string()));
            }
            self.record(format!("config:{}", config.ip_forwarding));
            Ok(())
        }

        async fn restore_raw(&self, snapshot: &str) -> Result<()> {
            self.record(format!("restore:{}", snapshot.len()));
            Ok(())
        }

        async fn counters(&self) -> Result<Vec<Counter>> {
            let raw = self.load().await?;
            Ok(crate::core::counters::parse_counters(&raw))
        }
    }

    /// Store stubs backed by plain vectors
    #[derive(Default)]
    struct MemStore {
        rules: StdMutex<Vec<Rule>>,
        nat_rules: StdMutex<Vec<NatRule>>,
        config: StdMutex<Option<FirewallConfig>>,
        history: StdMutex<Vec<HistoryEntry>>,
    }

    #[async_trait]
    impl RuleStore for MemStore {
        async fn list(&self) -> Result<Vec<Rule>> {
            Ok(self.rules.lock().unwrap().clone())
        }
        async fn get(&self, id: Uuid) -> Result<Rule> {
            self.rules
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| Error::NotFound {
                    kind: "rule",
                    id: id.to_string(),
                })
        }
        async fn create(&self, rule: Rule) -> Result<()> {
            self.rules.lock().unwrap().push(rule);
            Ok(())
        }
        async fn update(&self, rule: Rule) -> Result<()> {
            let mut rules = self.rules.lock().unwrap();
            let slot = rules
                .iter_mut()
                .find(|r| r.id == rule.id)
                .ok_or_else(|| Error::NotFound {
                    kind: "rule",
                    id: rule.id.to_string(),
                })?;
            *slot = rule;
            Ok(())
        }
        async fn delete(&self, id: Uuid) -> Result<()> {
            self.rules.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }
    }

    #[async_trait]
    impl NatRuleStore for MemStore {
        async fn list(&self) -> Result<Vec<NatRule>> {
            Ok(self.nat_rules.lock().unwrap().clone())
        }
        async fn get(&self, id: Uuid) -> Result<NatRule> {
            self.nat_rules
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| Error::NotFound {
                    kind: "nat rule",
                    id: id.to_string(),
                })
        }
        async fn create(&self, rule: NatRule) -> Result<()> {
            self.nat_rules.lock().unwrap().push(rule);
            Ok(())
        }
        async fn update(&self, rule: NatRule) -> Result<()> {
            let mut rules = self.nat_rules.lock().unwrap();
            let slot = rules
                .iter_mut()
                .find(|r| r.id == rule.id)
                .ok_or_else(|| Error::NotFound {
                    kind: "nat rule",
                    id: rule.id.to_string(),
                })?;
            *slot = rule;
            Ok(())
        }
        async fn delete(&self, id: Uuid) -> Result<()> {
            self.nat_rules.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }
    }

    #[async_trait]
    impl ConfigStore for MemStore {
        async fn get_or_default(&self) -> Result<FirewallConfig> {
            let mut config = self.config.lock().unwrap();
            if config.is_none() {
                *config = Some(FirewallConfig::new_default());
            }
            Ok(config.clone().unwrap())
        }
        async fn update(&self, new: FirewallConfig) -> Result<()> {
            *self.config.lock().unwrap() = Some(new);
            Ok(())
        }
    }

    #[async_trait]
    impl HistoryStore for MemStore {
        async fn save(&self, entry: HistoryEntry) -> Result<()> {
            self.history.lock().unwrap().push(entry);
            Ok(())
        }
        async fn latest(&self) -> Result<HistoryEntry> {
            self.history
                .lock()
                .unwrap()
                .last()
                .cloned()
                .ok_or(Error::NoSnapshot)
        }
        async fn list(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
            let mut entries = self.history.lock().unwrap().clone();
            entries.reverse();
            entries.truncate(limit);
            Ok(entries)
        }
    }

    fn service_with(engine: Arc<MockEngine>, store: Arc<MemStore>) -> FirewallService {
        FirewallService::with_config(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            engine,
        )
    }

    fn draft() -> RuleDraft {
        RuleDraft {
            chain: Chain::Input,
            protocol: Protocol::Tcp,
            src: String::new(),
            dst: String::new(),
            src_port: String::new(),
            dst_port: "22".to_string(),
            action: Action::Accept,
            enabled: true,
            comment: "ssh".to_string(),
            position: 0,
        }
    }

    #[tokio::test]
    async fn test_apply_happy_path_persists_snapshot() {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine.clone(), store.clone());

        service.create_rule(draft()).await.unwrap();
        let report = service.apply_rules().await.unwrap();

        assert_eq!(report.rule_count, 1);
        assert!(report.snapshot_captured);
        assert!(report.warnings.is_empty());
        assert_eq!(
            engine.events(),
            vec!["apply:1", "config:false", "nat:flush"]
        );

        let entry = store.latest().await.unwrap();
        assert!(entry.snapshot.contains("*filter"));
        assert_eq!(entry.checksum, snapshot_checksum(&entry.snapshot));
    }

    #[tokio::test]
    async fn test_apply_failure_skips_secondaries_and_history() {
        let engine = Arc::new(MockEngine::new());
        *engine.fail_apply.lock().unwrap() = true;
        let store = Arc::new(MemStore::default());
        let service = service_with(engine.clone(), store.clone());

        let err = service.apply_rules().await.unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));

        // No secondary applies ran, no history entry written
        assert!(engine.events().is_empty());
        assert!(matches!(store.latest().await, Err(Error::NoSnapshot)));
    }

    #[tokio::test]
    async fn test_nat_failure_is_soft_and_history_still_written() {
        let engine = Arc::new(MockEngine::new());
        *engine.fail_nat.lock().unwrap() = true;
        let store = Arc::new(MemStore::default());
        let service = service_with(engine.clone(), store.clone());

        let report = service.apply_rules().await.unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("apply NAT rules"));

        assert!(store.latest().await.is_ok());
    }

    #[tokio::test]
    async fn test_config_failure_is_soft() {
        let engine = Arc::new(MockEngine::new());
        *engine.fail_config.lock().unwrap() = true;
        let store = Arc::new(MemStore::default());
        let service = service_with(engine.clone(), store.clone());

        let report = service.apply_rules().await.unwrap();
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("apply firewall config")));
        // NAT still ran after the config soft failure
        assert!(engine.events().iter().any(|e| e == "nat:flush"));
    }

    #[tokio::test]
    async fn test_snapshot_failure_proceeds_without_history() {
        let engine = Arc::new(MockEngine::with_dump_failure());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine.clone(), store.clone());

        let report = service.apply_rules().await.unwrap();
        assert!(!report.snapshot_captured);
        assert!(report.warnings.iter().any(|w| w.contains("snapshot skipped")));
        assert!(matches!(store.latest().await, Err(Error::NoSnapshot)));
        // The filter apply still happened
        assert!(engine.events().iter().any(|e| e == "apply:0"));
    }

    #[tokio::test]
    async fn test_rollback_restores_latest() {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine.clone(), store.clone());

        service.apply_rules().await.unwrap();
        let entry = store.latest().await.unwrap();

        let restored = service.rollback().await.unwrap();
        assert_eq!(restored, entry.id);
        assert!(engine
            .events()
            .iter()
            .any(|e| e.starts_with("restore:")));
    }

    #[tokio::test]
    async fn test_rollback_without_history_fails() {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine, store);

        assert!(matches!(service.rollback().await, Err(Error::NoSnapshot)));
    }

    #[tokio::test]
    async fn test_rollback_detects_corrupted_snapshot() {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine, store.clone());

        store
            .save(HistoryEntry {
                id: Uuid::new_v4(),
                snapshot: "*filter\nCOMMIT\n".to_string(),
                description: String::new(),
                checksum: "deadbeef".to_string(),
                applied_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        assert!(matches!(
            service.rollback().await,
            Err(Error::SnapshotIntegrity { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rule_rejects_bad_cidr() {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine, store);

        let mut bad = draft();
        bad.src = "not-a-network".to_string();
        let err = service.create_rule(bad).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_create_rule_rejects_reversed_port_range() {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine, store);

        let mut bad = draft();
        bad.dst_port = "9000:80".to_string();
        assert!(service.create_rule(bad).await.is_err());
    }

    #[tokio::test]
    async fn test_update_config_round_trip() {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine, store);

        let config = service.update_config(true, false).await.unwrap();
        assert!(config.ip_forwarding);
        assert!(service.get_config().await.unwrap().ip_forwarding);
    }

    #[tokio::test]
    async fn test_counters_parsed_from_dump() {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemStore::default());
        let service = service_with(engine, store);

        let counters = service.counters().await.unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].chain, "INPUT");
        assert_eq!(counters[0].rule, "policy");
    }
}
