use buckforge::artifact::ArtifactKey;
use buckforge::config::GenConfig;
use buckforge::constants::STATE_FILE;
use buckforge::coordinator::{Coordinator, StateFile};
use buckforge::core::{BuildError, ErrorCategory};
use buckforge::graph::SourceSet;
use buckforge::scope::ScopeKind;
use buckforge::test_utils::{TestWorkspace, init_test_logging};
use buckforge::utils::fs::file_sha256;

use crate::files_with_extension;

const AUTO_VALUE: &str = "com.google.auto.value:auto-value:1.6";
const GUAVA: &str = "com.google.guava:guava:19.0";

fn key(coordinate: &str) -> ArtifactKey {
    coordinate.parse().unwrap()
}

#[tokio::test]
async fn shared_processor_is_cached_and_emitted_once() {
    init_test_logging(None);
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish_processor(AUTO_VALUE, &["com.google.auto.value.processor.AutoValueProcessor"])
        .unwrap();
    for module in [":a", ":b", ":c"] {
        ws.source_set(
            module,
            ScopeKind::Main,
            SourceSet {
                annotation_processors: vec![key(AUTO_VALUE)],
                ..SourceSet::default()
            },
        );
    }

    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    let report = coordinator.run().await.unwrap();
    assert_eq!(report.modules_visited, 3);

    let processor_dir = ws.cache_root().join("processor");
    assert_eq!(
        files_with_extension(&processor_dir, "jar"),
        vec!["com.google.auto.value.auto-value-1.6.jar".to_string()]
    );

    let rules = ws.read(".buckforge/cache/processor/BUCK").unwrap();
    assert_eq!(rules.matches("java_annotation_processor(").count(), 1);
    assert_eq!(rules.matches("prebuilt_jar(").count(), 1);
    assert!(rules.contains("\"com.google.auto.value.processor.AutoValueProcessor\""));

    assert_eq!(
        coordinator.processor_cache().processor_target(&key(AUTO_VALUE)),
        Some("//.buckforge/cache/processor:com.google.auto.value.auto-value-1.6-processor")
    );
}

#[tokio::test]
async fn republished_artifact_never_overwrites_cached_bytes() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish(GUAVA, b"guava build one").unwrap();
    ws.depends(":m", ScopeKind::Main, &[GUAVA]);

    let first = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    first.run().await.unwrap();
    let plain = ws.cache_root().join("external/com.google.guava.guava-19.0.jar");
    assert_eq!(std::fs::read(&plain).unwrap(), b"guava build one");

    // Same coordinate, different bytes
    let republished = ws.publish(GUAVA, b"guava build two").unwrap();
    let short = file_sha256(&republished).unwrap()[..8].to_string();

    let second = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    second.run().await.unwrap();

    assert_eq!(std::fs::read(&plain).unwrap(), b"guava build one");
    let suffixed = ws
        .cache_root()
        .join(format!("external/com.google.guava.guava-19.0-{short}.jar"));
    assert_eq!(std::fs::read(&suffixed).unwrap(), b"guava build two");

    let expected = format!("//.buckforge/cache/external:com.google.guava.guava-19.0-{short}");
    assert_eq!(second.dependency_manager().target_for(&key(GUAVA)), Some(expected.as_str()));
}

#[tokio::test]
async fn missing_artifact_fails_without_rule_file() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish(GUAVA, b"guava").unwrap();
    ws.depends(":ok", ScopeKind::Main, &[GUAVA]);
    ws.depends(":app", ScopeKind::Main, &[GUAVA, "missing:lib:1.0"]);

    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    let err = coordinator.run().await.unwrap_err();

    match &err {
        BuildError::UnresolvedDependency { coordinate, requested_by } => {
            assert_eq!(coordinate, "missing:lib:1.0");
            assert_eq!(requested_by.as_deref(), Some(":app (main)"));
        }
        other => panic!("expected an unresolved dependency, got {other}"),
    }
    assert_eq!(err.category(), ErrorCategory::UnresolvedDependency);
    assert!(!ws.cache_root().join("external/BUCK").exists());
    assert!(StateFile::read(&ws.path().join(STATE_FILE)).unwrap().is_none());
}

#[tokio::test]
async fn resolver_pointing_at_absent_file_is_unresolved() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish_missing("com.example:ghost:1.0").unwrap();
    ws.depends(":app", ScopeKind::Test, &["com.example:ghost:1.0"]);

    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    let err = coordinator.run().await.unwrap_err();
    assert!(
        matches!(err, BuildError::UnresolvedDependency { ref coordinate, .. } if coordinate == "com.example:ghost:1.0"),
        "got {err}"
    );
}

#[tokio::test]
async fn conflicting_versions_select_highest_with_diagnostic() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish(GUAVA, b"19").unwrap();
    ws.publish("com.google.guava:guava:20.0", b"20").unwrap();
    ws.depends(":old", ScopeKind::Main, &[GUAVA]);
    ws.depends(":new", ScopeKind::Main, &["com.google.guava:guava:20.0"]);

    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    let report = coordinator.run().await.unwrap();

    assert_eq!(
        files_with_extension(&ws.cache_root().join("external"), "jar"),
        vec!["com.google.guava.guava-20.0.jar".to_string()]
    );
    let conflicts: Vec<_> = report
        .diagnostics()
        .filter(|d| d.category == ErrorCategory::VersionConflict)
        .collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].coordinate.as_deref(), Some("com.google.guava:guava"));

    let manager = coordinator.dependency_manager();
    assert_eq!(manager.target_for(&key(GUAVA)), manager.target_for(&key("com.google.guava:guava:20.0")));
}

#[tokio::test]
async fn fail_policy_rejects_conflicts() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish(GUAVA, b"19").unwrap();
    ws.publish("com.google.guava:guava:20.0", b"20").unwrap();
    ws.depends(":old", ScopeKind::Main, &[GUAVA]);
    ws.depends(":new", ScopeKind::Main, &["com.google.guava:guava:20.0"]);

    let config = GenConfig::parse("[external]\nconflict_policy = \"fail\"\n").unwrap();
    let coordinator = Coordinator::from_model(ws.path(), &config, ws.model());
    let err = coordinator.run().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::VersionConflict);
    assert!(!ws.cache_root().join("external/BUCK").exists());
}

#[tokio::test]
async fn failed_rerun_drops_previous_rule_file() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish(GUAVA, b"19").unwrap();
    ws.publish("com.google.guava:guava:20.0", b"20").unwrap();
    ws.depends(":old", ScopeKind::Main, &[GUAVA]);
    ws.depends(":new", ScopeKind::Main, &["com.google.guava:guava:20.0"]);

    Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model())
        .run()
        .await
        .unwrap();
    assert!(ws.read(".buckforge/cache/external/BUCK").unwrap().contains("guava-20.0"));

    let config = GenConfig::parse("[external]\nconflict_policy = \"fail\"\n").unwrap();
    let err = Coordinator::from_model(ws.path(), &config, ws.model())
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::VersionConflict);
    assert!(!ws.cache_root().join("external/BUCK").exists());
}

#[tokio::test]
async fn local_jars_stay_in_place() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish_local("app/libs/vendor.jar", "com.example:vendor:1.0", b"vendor").unwrap();
    ws.depends(":app", ScopeKind::Main, &["com.example:vendor:1.0"]);

    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    coordinator.run().await.unwrap();

    assert!(files_with_extension(&ws.cache_root().join("external"), "jar").is_empty());
    assert!(coordinator.dependency_manager().target_for(&key("com.example:vendor:1.0")).is_none());
    assert!(ws.path().join("app/libs/vendor.jar").is_file());
}

#[tokio::test]
async fn rerun_produces_identical_rule_files() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish(GUAVA, b"guava").unwrap();
    ws.publish("junit:junit:4.12", b"junit").unwrap();
    ws.depends(":lib", ScopeKind::Main, &[GUAVA]);
    ws.depends(":lib", ScopeKind::Test, &[GUAVA, "junit:junit:4.12"]);

    Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model())
        .run()
        .await
        .unwrap();
    let first = ws.read(".buckforge/cache/external/BUCK").unwrap();
    let first_files = files_with_extension(&ws.cache_root().join("external"), "jar");

    let report = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model())
        .run()
        .await
        .unwrap();
    assert_eq!(ws.read(".buckforge/cache/external/BUCK").unwrap(), first);
    assert_eq!(files_with_extension(&ws.cache_root().join("external"), "jar"), first_files);
    assert_eq!(first_files.len(), 2);
    assert_eq!(report.scopes_resolved, 2);

    let state = StateFile::read(&ws.path().join(STATE_FILE)).unwrap().unwrap();
    assert_eq!(state.categories["external"], 2);
    assert_eq!(state.modules, 1);
}

#[tokio::test]
async fn kotlin_runtime_follows_configured_pin() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish("org.jetbrains.kotlin:kotlin-stdlib:1.3.72", b"stdlib").unwrap();
    let mut set = SourceSet::default();
    set.runtimes.insert(buckforge::graph::Language::Kotlin, "1.3.50".to_string());
    ws.source_set(":k", ScopeKind::Main, set);

    let config = GenConfig::parse(
        "[kotlin]\nversion = \"1.3.72\"\nartifacts = [\"org.jetbrains.kotlin:kotlin-stdlib\"]\n",
    )
    .unwrap();
    let coordinator = Coordinator::from_model(ws.path(), &config, ws.model());
    let report = coordinator.run().await.unwrap();

    let kotlin = report.reports.iter().find(|r| r.manager == "kotlin-runtime").unwrap();
    assert_eq!(kotlin.entries.len(), 1);
    assert_eq!(kotlin.entries[0].key(), &key("org.jetbrains.kotlin:kotlin-stdlib:1.3.72"));
    assert!(ws.read(".buckforge/cache/kotlin/BUCK").unwrap().contains("java_library("));
}

#[tokio::test]
async fn proguard_jar_is_pinned_from_the_classpath() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish("net.sf.proguard:proguard-base:6.2.2", b"proguard").unwrap();
    ws.depends(":app", ScopeKind::Main, &["net.sf.proguard:proguard-base:6.2.2"]);

    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    coordinator.run().await.unwrap();

    let proguard = coordinator.tool_manager().tool("proguard").unwrap();
    assert_eq!(proguard.version, "6.2.2");
    assert_eq!(
        proguard.path,
        ws.cache_root().join("tool/net.sf.proguard.proguard-base-6.2.2.jar")
    );
    assert_eq!(std::fs::read(&proguard.path).unwrap(), b"proguard");
    assert!(ws.read(".buckforge/cache/tool/BUCK").unwrap().contains("prebuilt_jar("));
}
