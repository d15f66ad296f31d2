use botpush_lib::engine::backup::BackupStore;
use botpush_lib::engine::config::PushConfig;
use botpush_lib::engine::credentials::CredentialSet;
use botpush_lib::engine::push::{AttemptState, ErrorKind, PushOutcome, ScriptSource, UpdateOrchestrator};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const BOT: &str = "4242";
const SCRIPT_PATH: &str = "/api/v2/bots/4242/script";

struct Harness {
    server: MockServer,
    dir: tempfile::TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    fn config(&self) -> PushConfig {
        PushConfig {
            token_url: format!("{}/oauth/v2/token", self.server.uri()),
            api_base: format!("{}/api/v2", self.server.uri()),
            backup_dir: self.backup_dir(),
            request_timeout_secs: 1,
            ..PushConfig::default()
        }
    }

    fn new_script(&self, content: &str) -> ScriptSource {
        let path = self.dir.path().join("new_script.dlz");
        fs::write(&path, content).unwrap();
        ScriptSource::File(path)
    }

    async fn token_ok(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1"})))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    async fn current_script(&self, script: &str) {
        Mock::given(method("GET"))
            .and(path(SCRIPT_PATH))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"script": script})))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    async fn put_responds(&self, script: &str, status: u16, times: u64) {
        Mock::given(method("PUT"))
            .and(path(SCRIPT_PATH))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_json(json!({"script": script})))
            .respond_with(ResponseTemplate::new(status))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    async fn put_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == "PUT")
            .count()
    }

    fn backups(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.backup_dir()) {
            Ok(rd) => rd.filter_map(Result::ok).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn creds() -> CredentialSet {
    CredentialSet::new("org-1", "client-1", "secret-1", "refresh-1", BOT)
}

/// Accepts the write only if a backup holding `expected` already exists
struct RequireBackup {
    dir: PathBuf,
    expected: String,
}

impl Respond for RequireBackup {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if backup_contains(&self.dir, &self.expected) {
            ResponseTemplate::new(200)
        } else {
            ResponseTemplate::new(409).set_body_string("write issued before backup")
        }
    }
}

fn backup_contains(dir: &Path, expected: &str) -> bool {
    fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(Result::ok)
                .any(|e| fs::read_to_string(e.path()).map(|c| c == expected).unwrap_or(false))
        })
        .unwrap_or(false)
}

#[tokio::test]
async fn scenario_a_auth_failure_aborts_without_side_effects() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&h.server).await;
    Mock::given(method("PUT")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&h.server).await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    assert!(matches!(outcome, PushOutcome::AbortedBeforeWrite { .. }));
    assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::Authentication));
    assert!(h.backups().is_empty());
    assert_eq!(h.put_requests().await, 0);
}

#[tokio::test]
async fn scenario_b_successful_push_keeps_backup() {
    let h = Harness::start().await;
    h.token_ok().await;
    h.current_script("OLD").await;
    h.put_responds("NEW", 200, 1).await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    assert!(outcome.is_success(), "unexpected outcome: {:?}", outcome);
    assert_eq!(outcome.exit_code(), 0);
    let backups = h.backups();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "OLD");
    assert_eq!(outcome.backup_path(), Some(backups[0].as_path()));
}

#[tokio::test]
async fn scenario_c_failed_write_is_rolled_back() {
    let h = Harness::start().await;
    h.token_ok().await;
    h.current_script("OLD").await;
    h.put_responds("NEW", 500, 1).await;
    h.put_responds("OLD", 200, 1).await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    assert!(matches!(outcome, PushOutcome::FailedAndRolledBack { .. }), "{:?}", outcome);
    assert_eq!(outcome.final_state(), AttemptState::RolledBack);
    assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::Write));
    assert_eq!(outcome.exit_code(), 1);
    assert!(!outcome.requires_manual_recovery());
}

#[tokio::test]
async fn scenario_d_rollback_failure_surfaces_backup() {
    let h = Harness::start().await;
    h.token_ok().await;
    h.current_script("OLD").await;
    h.put_responds("NEW", 500, 1).await;
    h.put_responds("OLD", 500, 1).await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    let PushOutcome::FailedRollbackAlsoFailed { backup, rollback_error, .. } = &outcome else {
        panic!("unexpected outcome: {:?}", outcome);
    };
    assert_eq!(rollback_error.kind(), ErrorKind::Rollback);
    assert_eq!(fs::read_to_string(&backup.path).unwrap(), "OLD");
    assert!(outcome.requires_manual_recovery());

    let summary = serde_json::to_value(outcome.summary()).unwrap();
    assert_eq!(summary["backup"]["path"], backup.path.display().to_string());
}

#[tokio::test]
async fn scenario_e_fetch_timeout_aborts_before_backup() {
    let h = Harness::start().await;
    h.token_ok().await;
    Mock::given(method("GET"))
        .and(path(SCRIPT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"script": "OLD"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("PUT")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&h.server).await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    assert!(matches!(outcome, PushOutcome::AbortedBeforeWrite { .. }));
    assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::Fetch));
    assert!(!h.backup_dir().exists());
}

#[tokio::test]
async fn write_timeout_is_rolled_back() {
    let h = Harness::start().await;
    h.token_ok().await;
    h.current_script("OLD").await;
    Mock::given(method("PUT"))
        .and(path(SCRIPT_PATH))
        .and(body_json(json!({"script": "NEW"})))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&h.server)
        .await;
    h.put_responds("OLD", 200, 1).await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    assert!(matches!(outcome, PushOutcome::FailedAndRolledBack { .. }), "{:?}", outcome);
    assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::Write));
    assert_eq!(h.put_requests().await, 2);
}

#[tokio::test]
async fn fetch_error_status_aborts_before_backup() {
    for status in [404, 401] {
        let h = Harness::start().await;
        h.token_ok().await;
        Mock::given(method("GET"))
            .and(path(SCRIPT_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string("no such bot"))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("PUT")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&h.server).await;

        let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
        let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

        assert!(matches!(outcome, PushOutcome::AbortedBeforeWrite { .. }), "{:?}", outcome);
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::Fetch));
        assert!(!h.backup_dir().exists());
        assert!(h.backups().is_empty());
    }
}

#[tokio::test]
async fn scenario_f_rollback_disabled() {
    let h = Harness::start().await;
    h.token_ok().await;
    h.current_script("OLD").await;
    h.put_responds("NEW", 500, 1).await;
    h.put_responds("OLD", 200, 0).await;

    let mut config = h.config();
    config.auto_rollback = false;
    let orchestrator = UpdateOrchestrator::new(&config).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    assert!(matches!(outcome, PushOutcome::FailedRollbackSkipped { .. }), "{:?}", outcome);
    assert!(outcome.backup().is_some());
    assert_eq!(h.put_requests().await, 1);
}

#[tokio::test]
async fn write_is_only_issued_after_backup_exists() {
    let h = Harness::start().await;
    h.token_ok().await;
    h.current_script("OLD").await;
    Mock::given(method("PUT"))
        .and(path(SCRIPT_PATH))
        .respond_with(RequireBackup {
            dir: h.backup_dir(),
            expected: "OLD".to_string(),
        })
        .expect(1)
        .mount(&h.server)
        .await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    assert!(outcome.is_success(), "{:?}", outcome);
}

#[tokio::test]
async fn rollback_sends_captured_bytes_exactly() {
    let h = Harness::start().await;
    let prior = "greet = \"héllo\"\r\n\tif x { reply(\"✓\") }\n";
    h.token_ok().await;
    h.current_script(prior).await;
    h.put_responds("NEW", 503, 1).await;
    h.put_responds(prior, 204, 1).await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    let outcome = orchestrator.push(&creds(), BOT, &h.new_script("NEW")).await;

    let backup = outcome.backup().unwrap();
    assert_eq!(backup.content, prior);
    assert_eq!(fs::read(&backup.path).unwrap(), prior.as_bytes());
    assert!(BackupStore::open(&h.backup_dir()).unwrap().verify(backup).unwrap());
    assert!(matches!(outcome, PushOutcome::FailedAndRolledBack { .. }));
}

#[tokio::test]
async fn connection_check_never_mutates() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1"})))
        .expect(3)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(SCRIPT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"script": "OLD"})))
        .expect(3)
        .mount(&h.server)
        .await;
    Mock::given(method("PUT")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&h.server).await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    for _ in 0..3 {
        assert!(orchestrator.test_connection(&creds()).await);
    }

    assert!(!h.backup_dir().exists());
}

#[tokio::test]
async fn connection_check_reports_auth_failure() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_code"})))
        .mount(&h.server)
        .await;

    let orchestrator = UpdateOrchestrator::new(&h.config()).unwrap();
    assert!(!orchestrator.test_connection(&creds()).await);
    assert_eq!(h.put_requests().await, 0);
}
