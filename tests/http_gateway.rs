//! Integration tests for the HTTP transport and the wired-up core, against a
//! mock collection service.

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reelsync::{
    AuthGateway, CollectionGateway, Config, Credentials, HttpGateway, MovieKey, MovieRef,
    SyncCore, SyncError, ViewContext,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn gateway_for(server: &MockServer) -> HttpGateway {
    init_tracing();
    HttpGateway::new(&Config::with_base_url(format!("{}/api", server.uri()))).unwrap()
}

fn matrix() -> MovieRef {
    MovieRef {
        key: MovieKey::movie(603),
        title: "The Matrix".to_string(),
        poster_path: Some("/matrix.jpg".to_string()),
        release_year: Some(1999),
    }
}

async fn mount_empty_collections(server: &MockServer) {
    for endpoint in ["/api/lists", "/api/favorites", "/api/ratings", "/api/quotes"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_fetch_lists_unwraps_envelope_and_camel_case() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "7b7aedcc-226b-4f4f-a4f4-92e58d0c4d12",
                "name": "Heists",
                "createdAt": "2024-01-01T00:00:00Z",
                "movies": [
                    { "tmdbId": 27205, "title": "Inception", "releaseYear": 2010 }
                ]
            }]
        })))
        .mount(&server)
        .await;

    let lists = gateway_for(&server).fetch_lists().await.unwrap();

    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].name, "Heists");
    assert!(lists[0].contains(&MovieKey::movie(27205)));
}

#[tokio::test]
async fn test_probe_translates_401_to_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let session = gateway_for(&server).probe().await.unwrap();
    assert!(session.is_none());
}

#[tokio::test]
async fn test_login_cookie_rides_subsequent_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_partial_json(json!({ "username": "neo" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc123; Path=/; HttpOnly")
                .set_body_json(json!({
                    "id": "3e1f1f4e-51f3-4f6e-9f1f-0b63a35ce6a1",
                    "username": "neo",
                    "displayName": "Neo"
                })),
        )
        .mount(&server)
        .await;
    // only a request carrying the session cookie matches
    Mock::given(method("GET"))
        .and(path("/api/lists"))
        .and(header("cookie", "session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let session = gateway
        .login(Credentials {
            username: "neo".to_string(),
            password: "redpill".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(session.display_name, "Neo");

    let lists = gateway.fetch_lists().await.unwrap();
    assert!(lists.is_empty());
}

#[tokio::test]
async fn test_status_codes_map_to_error_taxonomy() {
    let server = MockServer::start().await;
    let list_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path(format!("/api/lists/{}/movies", list_id)))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/api/lists/{}", list_id)))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "list not found" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/favorites"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/lists"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "name required" })),
        )
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);

    assert!(matches!(
        gateway.add_list_movie(list_id, matrix()).await,
        Err(SyncError::Conflict)
    ));
    assert!(matches!(
        gateway.delete_list(list_id).await,
        Err(SyncError::NotFound(msg)) if msg == "list not found"
    ));
    assert!(matches!(
        gateway.add_favorite(matrix()).await,
        Err(SyncError::Unauthorized)
    ));
    assert!(matches!(
        gateway.create_list(String::new(), String::new()).await,
        Err(SyncError::Validation(msg)) if msg == "name required"
    ));
}

#[tokio::test]
async fn test_create_quote_accepts_bare_payload() {
    let server = MockServer::start().await;
    let quote_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/api/quotes"))
        .and(body_partial_json(json!({
            "tmdbId": 603,
            "quoteText": "There is no spoon."
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": quote_id,
            "tmdbId": 603,
            "quoteText": "There is no spoon.",
            "quoter": "Spoon Boy"
        })))
        .mount(&server)
        .await;

    let quote = gateway_for(&server)
        .create_quote(reelsync::QuoteDraft {
            key: MovieKey::movie(603),
            quote_text: "There is no spoon.".to_string(),
            quoter: "Spoon Boy".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(quote.id, quote_id);
    assert_eq!(quote.key, MovieKey::movie(603));
}

async fn core_with_session(server: &MockServer) -> SyncCore {
    init_tracing();
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "3e1f1f4e-51f3-4f6e-9f1f-0b63a35ce6a1",
            "username": "neo",
            "displayName": "Neo"
        })))
        .mount(server)
        .await;
    mount_empty_collections(server).await;

    let core = SyncCore::new(&Config::with_base_url(format!("{}/api", server.uri()))).unwrap();
    core.session().probe().await.expect("session recovered");
    core
}

#[tokio::test]
async fn test_concurrent_toggles_share_one_request() {
    let server = MockServer::start().await;
    let core = core_with_session(&server).await;

    // exactly one POST must reach the service for the burst
    Mock::given(method("POST"))
        .and(path("/api/favorites"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = ViewContext::new("/movie/603");
    let (first, second) = tokio::join!(
        core.mutations().toggle_favorite(&ctx, matrix()),
        core.mutations().toggle_favorite(&ctx, matrix()),
    );

    // both callers observe the same single state change
    assert!(first.unwrap());
    assert!(second.unwrap());
    assert!(core.membership().is_favorite(&MovieKey::movie(603)).await);
}

#[tokio::test]
async fn test_add_to_list_end_to_end_updates_membership() {
    let server = MockServer::start().await;
    let list_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "3e1f1f4e-51f3-4f6e-9f1f-0b63a35ce6a1",
            "username": "neo",
            "displayName": "Neo"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": list_id, "name": "Sci-Fi", "movies": [] }]
        })))
        .mount(&server)
        .await;
    for endpoint in ["/api/favorites", "/api/ratings", "/api/quotes"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(format!("/api/lists/{}/movies", list_id)))
        .and(body_partial_json(json!({ "tmdbId": 603, "mediaType": "movie" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let core = SyncCore::new(&Config::with_base_url(format!("{}/api", server.uri()))).unwrap();
    core.session().probe().await.expect("session recovered");

    let ctx = ViewContext::new("/movie/603");
    core.mutations()
        .add_to_list(&ctx, list_id, matrix())
        .await
        .unwrap();

    let containing = core.membership().lists_containing(&MovieKey::movie(603)).await;
    assert_eq!(containing.len(), 1);
    assert_eq!(containing[0].id, list_id);

    let badge = core.membership().badge_for(&MovieKey::movie(603)).await;
    assert_eq!(badge.list_ids, vec![list_id]);
}

#[tokio::test]
async fn test_mid_session_401_tears_down_and_redirects() {
    let server = MockServer::start().await;
    let core = core_with_session(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/favorites"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let ctx = ViewContext::new("/movie/603");
    let result = core.mutations().toggle_favorite(&ctx, matrix()).await;

    match result {
        Err(SyncError::AuthRequired { origin }) => assert_eq!(origin, "/movie/603"),
        other => panic!("expected AuthRequired, got {:?}", other),
    }
    assert!(!core.session().is_authenticated().await);
    assert!(!core.membership().is_favorite(&MovieKey::movie(603)).await);
}
