//! CapabilityCacheRepository integration tests
//!
//! The cache is keyed by backend name and cascades with the registry.

use mcplex_core::{
    CapabilityCacheRepository, CapabilityDescriptor, CapabilitySnapshot, ServerDefinition,
    ServerDefinitionRepository,
};
use mcplex_storage::{Database, SqliteCapabilityCacheRepository, SqliteServerDefinitionRepository};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tests::{db::TestDatabase, fixtures};
use tokio::sync::Mutex;

struct Repos {
    definitions: SqliteServerDefinitionRepository,
    cache: SqliteCapabilityCacheRepository,
}

async fn repos(db: Database, names: &[&str]) -> Repos {
    let db = Arc::new(Mutex::new(db));
    let definitions = SqliteServerDefinitionRepository::new(db.clone());
    for name in names {
        definitions
            .insert(&ServerDefinition::new(*name, "cmd"))
            .await
            .unwrap();
    }
    Repos {
        definitions,
        cache: SqliteCapabilityCacheRepository::new(db),
    }
}

fn full_snapshot() -> CapabilitySnapshot {
    CapabilitySnapshot {
        tools: vec![
            CapabilityDescriptor::new("ping")
                .with_description("Replies pong")
                .with_schema(json!({"type": "object", "properties": {}}))
                .with_raw(json!({"name": "ping", "x-vendor": {"cost": 3}})),
            CapabilityDescriptor::new("echo"),
        ],
        resources: vec![CapabilityDescriptor::new("readme").with_uri("file:///echo/README.md")],
        prompts: vec![CapabilityDescriptor::new("greet").with_description("Say hello")],
    }
}

#[tokio::test]
async fn test_snapshot_is_preserved_verbatim() {
    let repos = repos(Database::open_in_memory().unwrap(), &["echo"]).await;

    repos.cache.save("echo", &full_snapshot()).await.unwrap();
    let loaded = repos.cache.load("echo").await.unwrap().expect("cached");

    assert_eq!(loaded, full_snapshot());
    assert_eq!(loaded.tools[0].raw["x-vendor"]["cost"], 3);
}

#[tokio::test]
async fn test_save_replaces_whole_snapshot() {
    let repos = repos(Database::open_in_memory().unwrap(), &["echo"]).await;

    repos.cache.save("echo", &full_snapshot()).await.unwrap();
    repos
        .cache
        .save("echo", &fixtures::tool_snapshot(&["only"]))
        .await
        .unwrap();

    let loaded = repos.cache.load("echo").await.unwrap().unwrap();
    assert_eq!(loaded.tools.len(), 1);
    assert_eq!(loaded.tools[0].name, "only");
    assert!(loaded.resources.is_empty());
    assert!(loaded.prompts.is_empty());
}

#[tokio::test]
async fn test_load_all_returns_each_backend() {
    let repos = repos(Database::open_in_memory().unwrap(), &["git", "echo"]).await;

    repos
        .cache
        .save("git", &fixtures::tool_snapshot(&["status", "log"]))
        .await
        .unwrap();
    repos
        .cache
        .save("echo", &fixtures::tool_snapshot(&["ping"]))
        .await
        .unwrap();

    let all = repos.cache.load_all().await.unwrap();
    let names: Vec<&str> = all.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["echo", "git"]);

    let git = &all[1].1;
    let tools: Vec<&str> = git.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tools, vec!["status", "log"]);
}

#[tokio::test]
async fn test_empty_snapshot_reads_as_absent() {
    let repos = repos(Database::open_in_memory().unwrap(), &["echo"]).await;

    repos
        .cache
        .save("echo", &CapabilitySnapshot::default())
        .await
        .unwrap();
    assert!(repos.cache.load("echo").await.unwrap().is_none());
}

#[tokio::test]
async fn test_deleting_definition_clears_cache() {
    let repos = repos(Database::open_in_memory().unwrap(), &["echo"]).await;

    repos.cache.save("echo", &full_snapshot()).await.unwrap();
    assert!(repos.definitions.delete("echo").await.unwrap());

    assert!(repos.cache.load("echo").await.unwrap().is_none());
    assert!(repos.cache.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cache_for_unregistered_backend_is_rejected() {
    let repos = repos(Database::open_in_memory().unwrap(), &[]).await;

    let result = repos.cache.save("ghost", &full_snapshot()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cache_survives_reopen() {
    let test_db = TestDatabase::new();
    {
        let db = Database::open(test_db.db_path()).unwrap();
        let repos = repos(db, &["echo"]).await;
        repos.cache.save("echo", &full_snapshot()).await.unwrap();
    }

    let reopened = test_db.reopen();
    let cache = SqliteCapabilityCacheRepository::new(Arc::new(Mutex::new(reopened.db)));
    let all = cache.load_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].1, full_snapshot());
}
