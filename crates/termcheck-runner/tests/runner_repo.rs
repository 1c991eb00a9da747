use serde_json::json;
use termcheck_core::{ComponentIdentifier, IssueQuery, ResultId, ValidateRequest};
use termcheck_runner::{Config, Runner};

const CATALOG: &str = r#"
rules:
  - id: SCT-001
    tooling_id: snomed
    evaluator_type: fixture
    check_type: fast
    message: Active concept without FSN
    config:
      findings:
        - { type: concept, id: "100" }
        - { type: concept, id: "200", highlights: [{ start: 3, length: 4 }] }
  - id: SCT-002
    tooling_id: snomed
    evaluator_type: fixture
    check_type: expensive
    config:
      fail: "source table missing"
"#;

fn setup() -> (tempfile::TempDir, Runner) {
    let dir = tempfile::tempdir().unwrap();
    Runner::init_repo(dir.path()).unwrap();
    let cfg = Config::load_from(&Config::config_path(dir.path())).unwrap();
    std::fs::write(cfg.catalog_path(dir.path()), CATALOG).unwrap();
    let runner = Runner::open(dir.path().to_path_buf()).unwrap();
    (dir, runner)
}

#[test]
fn init_creates_config_catalog_and_db() {
    let dir = tempfile::tempdir().unwrap();
    Runner::init_repo(dir.path()).unwrap();
    let cfg = Config::load_from(&Config::config_path(dir.path())).unwrap();
    assert!(cfg.catalog_path(dir.path()).exists());
    assert!(cfg.db_path(dir.path()).exists());

    let runner = Runner::open(dir.path().to_path_buf()).unwrap();
    assert!(runner.rules().unwrap().is_empty());
}

#[test]
fn validate_persists_issues_and_keeps_ids_across_runs() {
    let (_dir, runner) = setup();
    let result = ResultId::from_str("run-1");

    let descriptor = runner
        .validate(ValidateRequest::new(result.clone(), "MAIN/2026-09"))
        .unwrap();
    assert_eq!(descriptor.result_id, result);
    assert_eq!(descriptor.branch_path, "MAIN/2026-09");

    let first = runner.issues(&IssueQuery::for_result(result.clone())).unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|i| i.rule_id.as_str() == "SCT-001"));
    let highlighted = first.iter().find(|i| i.affected_component.component_id == "200").unwrap();
    assert_eq!(highlighted.highlights().len(), 1);

    let override_findings = json!([{ "type": "concept", "id": "100" }]);
    runner
        .validate(
            ValidateRequest::new(result.clone(), "MAIN/2026-09")
                .with_rules(["SCT-001"])
                .with_parameter("SCT-001.findings", override_findings),
        )
        .unwrap();
    let second = runner.issues(&IssueQuery::for_result(result)).unwrap();
    assert_eq!(second.len(), 1);
    let kept = first.iter().find(|i| i.affected_component.component_id == "100").unwrap();
    assert_eq!(second[0].id, kept.id);
}

#[test]
fn whitelist_entries_flag_issues_on_next_run() {
    let (_dir, runner) = setup();
    let entry = runner
        .whitelist_add("SCT-001", ComponentIdentifier::new("concept", "100"), "reviewer")
        .unwrap();
    assert_eq!(runner.whitelist().unwrap().len(), 1);

    let result = ResultId::from_str("run-2");
    runner.validate(ValidateRequest::new(result.clone(), "MAIN")).unwrap();
    let mut q = IssueQuery::for_result(result.clone());
    q.whitelisted = Some(true);
    let flagged = runner.issues(&q).unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].affected_component.component_id, "100");

    assert_eq!(runner.whitelist_remove(&[entry.as_str().to_string()]).unwrap(), 1);
    runner.validate(ValidateRequest::new(result, "MAIN")).unwrap();
    assert!(runner.issues(&q).unwrap().is_empty());
}

#[test]
fn whitelisting_unknown_rule_is_rejected() {
    let (_dir, runner) = setup();
    let err = runner
        .whitelist_add("NOPE", ComponentIdentifier::new("concept", "1"), "reviewer")
        .unwrap_err();
    assert!(err.to_string().contains("NOPE"));
    assert!(runner.whitelist().unwrap().is_empty());
}

#[test]
fn purge_removes_only_that_result() {
    let (_dir, runner) = setup();
    let keep = ResultId::from_str("keep");
    let drop = ResultId::from_str("drop");
    runner.validate(ValidateRequest::new(keep.clone(), "MAIN")).unwrap();
    runner.validate(ValidateRequest::new(drop.clone(), "MAIN")).unwrap();

    runner.purge(&drop).unwrap();
    assert!(runner.issues(&IssueQuery::for_result(drop)).unwrap().is_empty());
    assert_eq!(runner.issues(&IssueQuery::for_result(keep)).unwrap().len(), 2);
}
