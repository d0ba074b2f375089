mod common;

use serde_json::json;
use std::sync::{Arc, Mutex};
use tessera_sdk::{EventKind, MutationOptions, QueryOptions, SearchQuery, TableEvent};

fn recorder(events: &Arc<Mutex<Vec<TableEvent>>>) -> impl Fn(&TableEvent) -> Result<(), tessera_sdk::events::BoxError> {
    let events = events.clone();
    move |e: &TableEvent| {
        events.lock().unwrap().push(e.clone());
        Ok(())
    }
}

#[tokio::test]
async fn each_statement_emits_one_event() {
    let (registry, repo) = common::setup().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let channel = registry.get("main").unwrap().events("people");
    assert!(Arc::ptr_eq(&channel, repo.events()));
    channel.subscribe(EventKind::Inserted, recorder(&seen));
    channel.subscribe(EventKind::Selected, recorder(&seen));

    repo.insert(json!([{"name": "a"}, {"name": "b"}]), &MutationOptions::new())
        .await
        .unwrap();
    repo.find(SearchQuery::new().eq("name", "a"), &QueryOptions::new()).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    let insert = &seen[0];
    assert_eq!(insert.kind, EventKind::Inserted);
    assert_eq!(insert.connection, "main");
    assert_eq!(insert.tables, vec!["people".to_string()]);
    assert_eq!(insert.row_count, 2);
    assert!(insert.sql.starts_with("INSERT INTO \"people\""));
    assert_eq!(insert.params, vec![json!("a"), json!("b")]);

    let select = &seen[1];
    assert_eq!(select.kind, EventKind::Selected);
    assert_eq!(select.row_count, 1);
    assert_ne!(select.correlation_id, insert.correlation_id);
}

#[tokio::test]
async fn failing_subscribers_do_not_fail_the_operation() {
    let (_registry, repo) = common::setup().await;
    repo.events().subscribe(EventKind::Inserted, |_| Err("listener down".into()));
    repo.events().subscribe(EventKind::Inserted, |_| panic!("listener bug"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    repo.events().subscribe(EventKind::Inserted, recorder(&seen));

    let rows = repo.insert(json!({"name": "ok"}), &MutationOptions::new()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn refused_deletes_emit_nothing() {
    let (_registry, repo) = common::setup().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let token = repo.events().subscribe(EventKind::Deleted, recorder(&seen));
    assert!(repo.delete(None, &MutationOptions::new()).await.is_err());
    assert!(seen.lock().unwrap().is_empty());
    assert!(repo.events().unsubscribe(token));
}
