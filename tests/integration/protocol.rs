use buckforge::artifact::ArtifactKey;
use buckforge::config::GenConfig;
use buckforge::coordinator::{Coordinator, GenerationState, ManagerLifecycle};
use buckforge::core::BuildError;
use buckforge::graph::ModuleId;
use buckforge::scope::ScopeKind;
use buckforge::test_utils::TestWorkspace;
use std::sync::Arc;

fn workspace_with_modules(count: usize) -> TestWorkspace {
    let mut ws = TestWorkspace::new().unwrap();
    for i in 0..count {
        let coordinate = format!("com.example:lib{i}:1.0");
        ws.publish(&coordinate, format!("lib{i}").as_bytes()).unwrap();
        ws.depends(&format!(":m{i}"), ScopeKind::Main, &[coordinate.as_str()]);
    }
    ws
}

#[tokio::test]
async fn late_visit_is_rejected() {
    let ws = workspace_with_modules(2);
    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());

    coordinator.begin_generation().await.unwrap();
    coordinator.visit_module(&ModuleId::new(":m0").unwrap()).await.unwrap();
    coordinator.end_generation().await.unwrap();

    let err = coordinator.visit_module(&ModuleId::new(":m1").unwrap()).await.unwrap_err();
    assert!(matches!(err, BuildError::ProtocolViolation { .. }), "got {err}");
    assert!(err.is_programming_error());

    // The visited module made it into the output, the late one did not
    let manager = coordinator.dependency_manager();
    assert!(manager.target_for(&"com.example:lib0:1.0".parse().unwrap()).is_some());
    assert!(manager.target_for(&"com.example:lib1:1.0".parse().unwrap()).is_none());
}

#[tokio::test]
async fn end_generation_runs_once() {
    let ws = workspace_with_modules(1);
    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());

    coordinator.run().await.unwrap();
    let err = coordinator.end_generation().await.unwrap_err();
    assert!(matches!(err, BuildError::ProtocolViolation { .. }));
    assert_eq!(coordinator.state().await, GenerationState::Finalized);
}

#[tokio::test]
async fn managers_reject_register_and_finalize_after_finalize() {
    let ws = workspace_with_modules(1);
    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    coordinator.run().await.unwrap();

    let scope = coordinator
        .target_cache()
        .get_scope(&ModuleId::new(":m0").unwrap(), &ScopeKind::Main)
        .await
        .unwrap();
    for manager in coordinator.managers() {
        let late = manager.register(&scope).await.unwrap_err();
        assert!(late.is_programming_error(), "{}: {late}", manager.name());
        let again = manager.finalize().await.unwrap_err();
        assert!(again.is_programming_error(), "{}: {again}", manager.name());
    }

    let lifecycles = coordinator.manager_lifecycles().await;
    assert_eq!(lifecycles.len(), coordinator.managers().len());
    assert!(lifecycles.values().all(|l| *l == ManagerLifecycle::Finalized));
}

#[tokio::test]
async fn failed_manager_is_marked_failed() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish("com.google.guava:guava:19.0", b"19").unwrap();
    ws.publish("com.google.guava:guava:20.0", b"20").unwrap();
    ws.depends(":a", ScopeKind::Main, &["com.google.guava:guava:19.0"]);
    ws.depends(":b", ScopeKind::Main, &["com.google.guava:guava:20.0"]);

    let config = GenConfig::parse("[external]\nconflict_policy = \"fail\"\n").unwrap();
    let coordinator = Coordinator::from_model(ws.path(), &config, ws.model());
    assert!(coordinator.run().await.is_err());

    let lifecycles = coordinator.manager_lifecycles().await;
    assert_eq!(lifecycles["dependencies"], ManagerLifecycle::Failed);
    assert_eq!(lifecycles["annotation-processors"], ManagerLifecycle::Finalized);
    assert_eq!(coordinator.state().await, GenerationState::Finalized);
}

#[tokio::test]
async fn failed_visit_contributes_nothing() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish("com.google.guava:guava:19.0", b"guava").unwrap();
    ws.publish("junit:junit:4.12", b"junit").unwrap();
    ws.depends(":app", ScopeKind::Main, &["com.google.guava:guava:19.0"]);
    ws.depends(":app", ScopeKind::Test, &["missing:lib:1.0"]);
    ws.depends(":ok", ScopeKind::Main, &["junit:junit:4.12"]);

    let coordinator = Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model());
    coordinator.begin_generation().await.unwrap();
    let err = coordinator.visit_module(&ModuleId::new(":app").unwrap()).await.unwrap_err();
    assert!(matches!(err, BuildError::UnresolvedDependency { .. }), "got {err}");
    coordinator.visit_module(&ModuleId::new(":ok").unwrap()).await.unwrap();

    let report = coordinator.end_generation().await.unwrap();
    assert_eq!(report.modules_visited, 1);

    let manager = coordinator.dependency_manager();
    assert!(manager.target_for(&"com.google.guava:guava:19.0".parse().unwrap()).is_none());
    assert!(manager.target_for(&"junit:junit:4.12".parse().unwrap()).is_some());
    let rules = ws.read(".buckforge/cache/external/BUCK").unwrap();
    assert!(!rules.contains("guava"));
    assert!(rules.contains("junit.junit-4.12"));
}

/// Every visit either lands before the barrier, and is represented in the
/// output, or is rejected. None is silently lost.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn end_generation_is_a_barrier_for_in_flight_visits() {
    const MODULES: usize = 24;
    let ws = workspace_with_modules(MODULES);
    let coordinator = Arc::new(Coordinator::from_model(ws.path(), &GenConfig::default(), ws.model()));
    coordinator.begin_generation().await.unwrap();

    let mut visits = Vec::new();
    for i in 0..MODULES {
        let coordinator = Arc::clone(&coordinator);
        visits.push(tokio::spawn(async move {
            let module = ModuleId::new(&format!(":m{i}")).unwrap();
            (i, coordinator.visit_module(&module).await)
        }));
    }
    tokio::task::yield_now().await;
    coordinator.end_generation().await.unwrap();

    let manager = coordinator.dependency_manager();
    for visit in visits {
        let (i, result) = visit.await.unwrap();
        let key: ArtifactKey = format!("com.example:lib{i}:1.0").parse().unwrap();
        match result {
            Ok(()) => assert!(manager.target_for(&key).is_some(), ":m{i} registered but is missing from output"),
            Err(e) => {
                assert!(e.is_programming_error(), ":m{i} failed with {e}");
                assert!(manager.target_for(&key).is_none());
            }
        }
    }
}
