use assert_cmd::Command;
use buckforge::scope::ScopeKind;
use buckforge::test_utils::TestWorkspace;
use predicates::prelude::*;

fn buckforge(ws: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("buckforge").unwrap();
    cmd.current_dir(ws.path())
        .env_remove("BUCKFORGE_CONFIG")
        .env_remove("BUCKFORGE_CACHE_DIR")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn generated_workspace() -> TestWorkspace {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish("com.google.guava:guava:19.0", b"guava").unwrap();
    ws.publish("junit:junit:4.12", b"junit").unwrap();
    ws.depends(":app", ScopeKind::Main, &["com.google.guava:guava:19.0"]);
    ws.depends(":app", ScopeKind::Test, &["junit:junit:4.12"]);
    ws.write_model("model.json").unwrap();
    ws
}

#[test]
fn generate_writes_rules_and_state() {
    let ws = generated_workspace();

    buckforge(&ws)
        .args(["generate", "--model", "model.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generation complete!"))
        .stdout(predicate::str::contains("1 modules, 2 scopes"));

    assert!(ws.read(".buckforge/cache/external/BUCK").unwrap().contains("junit.junit-4.12"));
    assert!(ws.path().join(".buckforge/state/STATE").is_file());
}

#[test]
fn generate_reports_missing_artifacts() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.depends(":app", ScopeKind::Main, &["missing:lib:1.0"]);
    ws.write_model("model.json").unwrap();

    buckforge(&ws)
        .args(["generate", "--model", "model.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing:lib:1.0"));
    assert!(!ws.path().join(".buckforge/cache/external/BUCK").exists());
}

#[test]
fn generate_rejects_invalid_config() {
    let ws = generated_workspace();
    ws.write_config("max_parallel = 0\n").unwrap();

    buckforge(&ws)
        .args(["generate", "--model", "model.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_parallel"));
}

#[test]
fn quiet_generate_prints_nothing() {
    let ws = generated_workspace();
    buckforge(&ws)
        .args(["--quiet", "generate", "--model", "model.json"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn cache_info_lists_categories() {
    let ws = generated_workspace();
    buckforge(&ws).args(["generate", "--model", "model.json"]).assert().success();

    buckforge(&ws)
        .args(["cache", "info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("external"))
        .stdout(predicate::str::contains("Last generation"));
}

#[test]
fn clean_all_removes_caches() {
    let ws = generated_workspace();
    buckforge(&ws).args(["generate", "--model", "model.json"]).assert().success();

    buckforge(&ws).arg("clean").assert().success();
    assert!(!ws.path().join(".buckforge/state").exists());
    assert!(ws.cache_root().exists());

    buckforge(&ws).args(["clean", "--all"]).assert().success();
    assert!(!ws.cache_root().exists());
}

#[test]
fn workspace_flag_overrides_current_dir() {
    let ws = generated_workspace();
    let other = tempfile::TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("buckforge").unwrap();
    cmd.current_dir(other.path())
        .env_remove("BUCKFORGE_CONFIG")
        .env_remove("BUCKFORGE_CACHE_DIR")
        .arg("--workspace")
        .arg(ws.path())
        .args(["generate", "--model", "model.json"])
        .assert()
        .success();
    assert!(ws.path().join(".buckforge/cache/external/BUCK").is_file());
}
