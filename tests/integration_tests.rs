//! Integration tests for fwctl
//!
//! These tests verify end-to-end functionality across the real JSON stores
//! and the apply/rollback orchestrator. The engine seam is substituted with
//! a recording fake; the iptables binaries themselves need CAP_NET_ADMIN
//! and are covered by the engine module's own process-plumbing tests.

use async_trait::async_trait;
use fwctl::core::engine::Engine;
use fwctl::core::error::{Error, Result};
use fwctl::core::rules::{Counter, FirewallConfig, NatRule, Rule};
use fwctl::core::ruleset::{build_filter_ruleset, build_nat_ruleset};
use fwctl::core::service::{FirewallService, NatRuleDraft, RuleDraft};
use fwctl::store::json::{JsonHistoryStore, JsonStore};
use fwctl::store::HistoryStore;
use fwctl::{Action, Chain, NatKind, Protocol};
use std::sync::{Arc, Mutex};

const LIVE_DUMP: &str = "\
*filter
:INPUT ACCEPT [40:2048]
:FORWARD DROP [0:0]
:OUTPUT ACCEPT [12:700]
[10:512] -A INPUT -p tcp --dport 22 -j ACCEPT
COMMIT
";

/// Fake engine that renders rulesets exactly like the real driver and
/// records everything it is asked to do.
#[derive(Default)]
struct RecordingEngine {
    fail_load: bool,
    fail_apply: bool,
    fail_nat: bool,
    log: Mutex<Vec<String>>,
}

impl RecordingEngine {
    fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    async fn load(&self) -> Result<String> {
        if self.fail_load {
            return Err(Error::Internal("save unavailable".to_string()));
        }
        Ok(LIVE_DUMP.to_string())
    }

    async fn apply(&self, rules: &[Rule]) -> Result<()> {
        if self.fail_apply {
            return Err(Error::Engine {
                command: "iptables-restore".to_string(),
                stderr: "line 2 failed".to_string(),
                exit_code: Some(2),
            });
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("filter:{}", build_filter_ruleset(rules)));
        Ok(())
    }

    async fn apply_nat(&self, nat_rules: &[NatRule]) -> Result<()> {
        if self.fail_nat {
            return Err(Error::Engine {
                command: "iptables-restore".to_string(),
                stderr: "nat line failed".to_string(),
                exit_code: Some(2),
            });
        }
        let event = if nat_rules.is_empty() {
            "nat-flush".to_string()
        } else {
            format!("nat:{}", build_nat_ruleset(nat_rules))
        };
        self.log.lock().unwrap().push(event);
        Ok(())
    }

    async fn apply_config(&self, config: &FirewallConfig) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("sysctl:ip_forward={}", i32::from(config.ip_forwarding)));
        Ok(())
    }

    async fn restore_raw(&self, snapshot: &str) -> Result<()> {
        self.log.lock().unwrap().push(format!("restore:{snapshot}"));
        Ok(())
    }

    async fn counters(&self) -> Result<Vec<Counter>> {
        let raw = self.load().await?;
        Ok(fwctl::core::counters::parse_counters(&raw))
    }
}

struct Harness {
    service: FirewallService,
    engine: Arc<RecordingEngine>,
    history: Arc<JsonHistoryStore>,
    _data_dir: tempfile::TempDir,
    _state_dir: tempfile::TempDir,
}

async fn harness_with_engine(engine: RecordingEngine) -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();

    let store = Arc::new(JsonStore::open(data_dir.path()).await.unwrap());
    let history = Arc::new(JsonHistoryStore::open(state_dir.path()));
    let engine = Arc::new(engine);

    let service = FirewallService::with_config(
        store.clone(),
        history.clone(),
        store.clone(),
        store,
        engine.clone(),
    );

    Harness {
        service,
        engine,
        history,
        _data_dir: data_dir,
        _state_dir: state_dir,
    }
}

async fn harness() -> Harness {
    harness_with_engine(RecordingEngine::default()).await
}

fn ssh_draft() -> RuleDraft {
    RuleDraft {
        chain: Chain::Input,
        protocol: Protocol::Tcp,
        src: "192.168.1.0/24".to_string(),
        dst: String::new(),
        src_port: String::new(),
        dst_port: "22".to_string(),
        action: Action::Accept,
        enabled: true,
        comment: "allow ssh".to_string(),
        position: 0,
    }
}

fn dnat_draft() -> NatRuleDraft {
    NatRuleDraft {
        name: "web forward".to_string(),
        kind: NatKind::Dnat,
        protocol: Protocol::Tcp,
        in_interface: "eth0".to_string(),
        out_interface: String::new(),
        source_ip: String::new(),
        source_port: String::new(),
        dest_ip: String::new(),
        dest_port: "8080".to_string(),
        nat_to_ip: "10.0.0.5".to_string(),
        nat_to_port: "80".to_string(),
        comment: String::new(),
        enabled: true,
        position: 0,
    }
}

#[tokio::test]
async fn test_apply_translates_stored_rules_to_engine_text() {
    let h = harness().await;
    h.service.create_rule(ssh_draft()).await.unwrap();

    let report = h.service.apply_rules().await.unwrap();
    assert_eq!(report.rule_count, 1);
    assert!(report.warnings.is_empty());

    let events = h.engine.events();
    let filter = events
        .iter()
        .find(|e| e.starts_with("filter:"))
        .expect("filter apply recorded");
    assert!(filter.contains(
        "-A INPUT -p tcp -s 192.168.1.0/24 --dport 22 -m comment --comment allow ssh -j ACCEPT"
    ));
    assert!(filter.contains(":FORWARD DROP [0:0]"));
    assert!(filter.ends_with("COMMIT\n"));
}

#[tokio::test]
async fn test_apply_persists_checksummed_snapshot() {
    let h = harness().await;
    let report = h.service.apply_rules().await.unwrap();
    assert!(report.snapshot_captured);

    let entry = h.history.latest().await.unwrap();
    assert_eq!(entry.snapshot, LIVE_DUMP);
    assert_eq!(
        entry.checksum,
        fwctl::core::service::snapshot_checksum(LIVE_DUMP)
    );
    assert!(entry.description.contains("snapshot before apply"));
}

#[tokio::test]
async fn test_rollback_restores_dump_verbatim() {
    let h = harness().await;
    h.service.apply_rules().await.unwrap();

    let restored = h.service.rollback().await.unwrap();
    let latest = h.history.latest().await.unwrap();
    assert_eq!(restored, latest.id);

    let events = h.engine.events();
    assert!(events.contains(&format!("restore:{LIVE_DUMP}")));
}

#[tokio::test]
async fn test_rollback_with_empty_history_errors() {
    let h = harness().await;
    assert!(matches!(h.service.rollback().await, Err(Error::NoSnapshot)));
}

#[tokio::test]
async fn test_filter_failure_aborts_whole_sequence() {
    let h = harness_with_engine(RecordingEngine {
        fail_apply: true,
        ..RecordingEngine::default()
    })
    .await;

    let err = h.service.apply_rules().await.unwrap_err();
    assert!(matches!(err, Error::Engine { .. }));

    // No secondary applies ran and no history entry was written
    assert!(h.engine.events().is_empty());
    assert!(matches!(h.history.latest().await, Err(Error::NoSnapshot)));
}

#[tokio::test]
async fn test_nat_failure_soft_apply_still_succeeds() {
    let h = harness_with_engine(RecordingEngine {
        fail_nat: true,
        ..RecordingEngine::default()
    })
    .await;

    let report = h.service.apply_rules().await.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("apply NAT rules"));

    // Snapshot still persisted despite the NAT failure
    assert!(h.history.latest().await.is_ok());
}

#[tokio::test]
async fn test_load_failure_applies_without_rollback_point() {
    let h = harness_with_engine(RecordingEngine {
        fail_load: true,
        ..RecordingEngine::default()
    })
    .await;

    let report = h.service.apply_rules().await.unwrap();
    assert!(!report.snapshot_captured);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("snapshot skipped")));
    assert!(h.engine.events().iter().any(|e| e.starts_with("filter:")));
    assert!(matches!(h.history.latest().await, Err(Error::NoSnapshot)));
}

#[tokio::test]
async fn test_empty_nat_set_flushes_table() {
    let h = harness().await;
    h.service.apply_rules().await.unwrap();
    assert!(h.engine.events().contains(&"nat-flush".to_string()));
}

#[tokio::test]
async fn test_nat_rules_rendered_into_their_stage() {
    let h = harness().await;
    h.service.create_nat_rule(dnat_draft()).await.unwrap();

    h.service.apply_rules().await.unwrap();

    let events = h.engine.events();
    let nat = events
        .iter()
        .find(|e| e.starts_with("nat:"))
        .expect("nat apply recorded");
    assert!(nat.contains(
        "-A PREROUTING -i eth0 -p tcp --dport 8080 -j DNAT --to-destination=10.0.0.5:80"
    ));
    assert!(!nat.contains("-A POSTROUTING -i"));
}

#[tokio::test]
async fn test_disabled_rules_stored_but_not_applied() {
    let h = harness().await;
    let mut disabled = ssh_draft();
    disabled.enabled = false;
    disabled.comment = "disabled ssh".to_string();
    h.service.create_rule(disabled).await.unwrap();

    let report = h.service.apply_rules().await.unwrap();
    assert_eq!(report.rule_count, 1); // stored

    let events = h.engine.events();
    let filter = events.iter().find(|e| e.starts_with("filter:")).unwrap();
    assert!(!filter.contains("disabled ssh")); // but never rendered
}

#[tokio::test]
async fn test_rules_apply_in_position_order() {
    let h = harness().await;

    let mut second = ssh_draft();
    second.position = 10;
    second.comment = "second rule".to_string();
    h.service.create_rule(second).await.unwrap();

    let mut first = ssh_draft();
    first.position = 1;
    first.comment = "first rule".to_string();
    h.service.create_rule(first).await.unwrap();

    h.service.apply_rules().await.unwrap();

    let events = h.engine.events();
    let filter = events.iter().find(|e| e.starts_with("filter:")).unwrap();
    assert!(filter.find("first rule").unwrap() < filter.find("second rule").unwrap());
}

#[tokio::test]
async fn test_counters_round_trip_from_dump() {
    let h = harness().await;
    let counters = h.service.counters().await.unwrap();

    let policies: Vec<_> = counters.iter().filter(|c| c.rule == "policy").collect();
    assert_eq!(policies.len(), 3);
    assert_eq!(policies[0].chain, "INPUT");
    assert_eq!(policies[0].packets, 40);
    assert_eq!(policies[1].chain, "FORWARD");
    assert_eq!(policies[1].packets, 0);

    let rule_counters: Vec<_> = counters.iter().filter(|c| c.rule != "policy").collect();
    assert_eq!(rule_counters.len(), 1);
    assert_eq!(rule_counters[0].packets, 10);
    assert_eq!(rule_counters[0].bytes, 512);
}

#[tokio::test]
async fn test_crud_validation_rejects_injection_at_the_boundary() {
    let h = harness().await;

    let mut bad = ssh_draft();
    bad.src = "10.0.0.1; rm -rf /".to_string();
    assert!(matches!(
        h.service.create_rule(bad).await,
        Err(Error::Validation { .. })
    ));

    let mut bad_nat = dnat_draft();
    bad_nat.in_interface = "eth0$(reboot)".to_string();
    assert!(matches!(
        h.service.create_nat_rule(bad_nat).await,
        Err(Error::Validation { .. })
    ));
}

#[tokio::test]
async fn test_config_toggle_reaches_engine() {
    let h = harness().await;
    h.service.update_config(true, false).await.unwrap();

    h.service.apply_rules().await.unwrap();

    assert!(h
        .engine
        .events()
        .contains(&"sysctl:ip_forward=1".to_string()));
}

#[tokio::test]
async fn test_consecutive_applies_append_history() {
    let h = harness().await;
    h.service.apply_rules().await.unwrap();
    h.service.apply_rules().await.unwrap();

    let entries = h.history.list(10).await.unwrap();
    assert_eq!(entries.len(), 2);
}
