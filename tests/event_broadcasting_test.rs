mod common;

use artist_atlas::ClientEvent;
use common::{client_with, deezer_artist, fast_config, ScriptedClient};
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

#[test_log::test(tokio::test)]
async fn test_new_client_has_no_events() {
    let script = ScriptedClient::new();
    let client = client_with(&script, fast_config());
    let mut events = client.subscribe();

    assert!(client.latest_event().is_none());
    let no_event = timeout(Duration::from_millis(10), events.recv()).await;
    assert!(no_event.is_err());
}

#[test_log::test(tokio::test)]
async fn test_both_providers_report_on_one_broadcaster() {
    let script = ScriptedClient::new();
    script.get("/api/lastfm/similar", 200, json!({"related": [{"name": "Earth", "match": "0.8"}]}));
    script.get("/api/deezer/search", 200, json!({"matches": [deezer_artist(2, "Earth")]}));
    let client = client_with(&script, fast_config());
    let mut events = client.subscribe();

    let similar = client.lastfm().get_similar_artists("Boris", 5).await;
    client
        .deezer()
        .find_artist_by_name(&similar[0].artist.name)
        .await
        .unwrap();

    let mut started = Vec::new();
    let mut completed = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::RequestStarted { request } => started.push(request.path),
            ClientEvent::RequestCompleted {
                request,
                status_code,
                ..
            } => completed.push((request.path, status_code)),
            _ => {}
        }
    }

    assert_eq!(started, vec!["/api/lastfm/similar", "/api/deezer/search"]);
    assert_eq!(
        completed,
        vec![
            ("/api/lastfm/similar".to_string(), 200),
            ("/api/deezer/search".to_string(), 200)
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_watch_sees_latest_event() {
    let script = ScriptedClient::new();
    script.get("/api/deezer/related", 500, json!({}));
    let client = client_with(&script, fast_config());
    let mut watcher = client.watch();

    client.deezer().get_related_artists("1").await;

    watcher.changed().await.unwrap();
    let latest = watcher.borrow().clone();
    assert!(matches!(
        latest,
        Some(ClientEvent::RequestCompleted {
            status_code: 500,
            ..
        })
    ));
    assert_eq!(client.latest_event(), latest);
}
