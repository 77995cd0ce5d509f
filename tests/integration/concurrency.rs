use buckforge::artifact::{ArtifactKey, HashMode};
use buckforge::cache::{CacheCategory, DependencyCache};
use buckforge::config::GenConfig;
use buckforge::coordinator::Coordinator;
use buckforge::graph::ModuleId;
use buckforge::resolver::{ResolveContext, StaticResolver};
use buckforge::scope::{ScopeKind, TargetCache};
use buckforge::test_utils::TestWorkspace;
use std::sync::Arc;

use crate::files_with_extension;

fn cache_for(ws: &TestWorkspace) -> Arc<DependencyCache> {
    let resolver = ws
        .model()
        .artifacts()
        .iter()
        .fold(StaticResolver::new(), |r, (key, path)| r.with(key.clone(), path.clone()));
    let resolve = ResolveContext::new(Arc::new(resolver), HashMode::Content, ws.path());
    Arc::new(DependencyCache::new(CacheCategory::External, &ws.cache_root(), resolve))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_fetches_copy_once() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish("com.squareup.okio:okio:2.4.3", &vec![7u8; 256 * 1024]).unwrap();
    let cache = cache_for(&ws);
    let key: ArtifactKey = "com.squareup.okio:okio:2.4.3".parse().unwrap();
    let artifact = cache.resolve_context().resolve(&key, None).unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let cache = Arc::clone(&cache);
        let artifact = artifact.clone();
        handles.push(tokio::spawn(async move { cache.get(&artifact, false).await }));
    }

    let mut paths = Vec::new();
    for handle in handles {
        paths.push(handle.await.unwrap().unwrap().path().to_path_buf());
    }
    paths.dedup();
    assert_eq!(paths.len(), 1);

    let stats = cache.stats();
    assert_eq!(stats.copies, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(
        files_with_extension(cache.root(), "jar"),
        vec!["com.squareup.okio.okio-2.4.3.jar".to_string()]
    );
}

#[tokio::test]
async fn versions_of_one_dependency_get_distinct_entries() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish("com.example:lib:1.0", b"same bytes").unwrap();
    ws.publish("com.example:lib:2.0", b"same bytes").unwrap();
    let cache = cache_for(&ws);
    let resolve = cache.resolve_context();

    let v1 = resolve.resolve(&"com.example:lib:1.0".parse().unwrap(), None).unwrap();
    let v2 = resolve.resolve(&"com.example:lib:2.0".parse().unwrap(), None).unwrap();
    let (a, b) = tokio::try_join!(cache.get(&v1, false), cache.get(&v2, false)).unwrap();

    assert_ne!(a.path(), b.path());
    assert_ne!(a.rule_name(), b.rule_name());
    assert_eq!(cache.get(&v1, false).await.unwrap(), a);
    assert_eq!(cache.stats().copies, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scope_resolution_runs_once_for_concurrent_callers() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.publish("junit:junit:4.12", b"junit").unwrap();
    ws.depends(":lib", ScopeKind::Test, &["junit:junit:4.12"]);

    let model = ws.model();
    let resolve = ResolveContext::new(Arc::new(model.resolver()), HashMode::Content, ws.path());
    let targets = Arc::new(TargetCache::new(Arc::new(model), resolve));
    let module = ModuleId::new(":lib").unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let targets = Arc::clone(&targets);
        let module = module.clone();
        handles.push(tokio::spawn(async move { targets.get_scope(&module, &ScopeKind::Test).await }));
    }
    let mut scopes = Vec::new();
    for handle in handles {
        scopes.push(handle.await.unwrap().unwrap());
    }

    assert!(scopes.iter().all(|s| Arc::ptr_eq(s, &scopes[0])));
    assert_eq!(targets.resolution_count(), 1);
    assert_eq!(scopes[0].external_artifacts().count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_visits_share_the_cache() {
    let mut ws = TestWorkspace::new().unwrap();
    let shared = ["com.google.guava:guava:28.1-android", "junit:junit:4.12", "com.squareup.okio:okio:2.4.3"];
    for coordinate in shared {
        ws.publish(coordinate, coordinate.as_bytes()).unwrap();
    }
    for i in 0..40 {
        ws.depends(&format!(":feature:f{i}"), ScopeKind::Main, &shared);
    }

    let config = GenConfig::parse("max_parallel = 8\n").unwrap();
    let coordinator = Coordinator::from_model(ws.path(), &config, ws.model());
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.modules_visited, 40);
    assert_eq!(report.scopes_resolved, 40);
    assert_eq!(files_with_extension(&ws.cache_root().join("external"), "jar").len(), 3);
    let rules = ws.read(".buckforge/cache/external/BUCK").unwrap();
    assert_eq!(rules.matches("prebuilt_jar(").count(), 3);
}
