use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use netroster::db::{self, NewOperator};
use netroster::directory::{DirectoryService, LookupError};
use netroster::enrich::Enricher;
use netroster::listing::{FetchError, ListingSource};
use netroster::model::EnrichmentRecord;
use netroster::pipeline::BatchProcessor;
use netroster::server::{router, AppContext};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

struct StaticListing(&'static str);

#[async_trait]
impl ListingSource for StaticListing {
    async fn fetch(&self) -> Result<String, FetchError> {
        Ok(self.0.to_string())
    }
}

struct FailingListing;

#[async_trait]
impl ListingSource for FailingListing {
    async fn fetch(&self) -> Result<String, FetchError> {
        Err(FetchError::Status(reqwest::StatusCode::NOT_FOUND))
    }
}

struct MissDirectory;

#[async_trait]
impl DirectoryService for MissDirectory {
    async fn lookup(&self, _call_sign: &str) -> Result<Option<EnrichmentRecord>, LookupError> {
        Ok(None)
    }
}

fn make_ctx(pool: sqlx::SqlitePool, listing: Arc<dyn ListingSource>) -> AppContext {
    let enricher = Arc::new(Enricher::new(pool.clone(), Arc::new(MissDirectory), 24));
    let processor = Arc::new(BatchProcessor::new(pool.clone(), enricher, 4));
    AppContext {
        pool,
        listing,
        processor,
        listing_source: "https://example.org/netlist/precheckin.txt".to_string(),
    }
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let pool = setup_pool().await;
    let app = router(make_ctx(pool, Arc::new(StaticListing(""))));

    let res = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "ok");
}

#[tokio::test]
async fn get_pre_checkin_decorates_known_operators() {
    let pool = setup_pool().await;
    db::insert_operator(
        &pool,
        &NewOperator {
            call_sign: "W1AW".into(),
            name: Some("Hiram P Maxim".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let listing = StaticListing("W1AW, Hiram, Newington CT, No\nN2SWJ, Scott, Greer SC, Yes\n");
    let app = router(make_ctx(pool, Arc::new(listing)));

    let res = app
        .oneshot(Request::get("/pre-checkin").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(
        body["source"],
        "https://example.org/netlist/precheckin.txt"
    );
    assert!(body["fetchedAt"].is_string());

    let participants = body["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 2);

    assert_eq!(participants[0]["callSign"], "W1AW");
    assert_eq!(participants[0]["hasOperatorRecord"], true);
    assert_eq!(participants[0]["operatorInfo"]["name"], "Hiram P Maxim");

    assert_eq!(participants[1]["callSign"], "N2SWJ");
    assert_eq!(participants[1]["announce"], true);
    assert_eq!(participants[1]["hasOperatorRecord"], false);
    assert!(participants[1].get("operatorInfo").is_none());
}

#[tokio::test]
async fn get_pre_checkin_maps_fetch_failure_to_bad_gateway() {
    let pool = setup_pool().await;
    let app = router(make_ctx(pool, Arc::new(FailingListing)));

    let res = app
        .oneshot(Request::get("/pre-checkin").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let body = body_json(res).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn process_registers_selected_participants() {
    let pool = setup_pool().await;
    let sid = db::insert_session(&pool, "Monday Net", None).await.unwrap();
    let app = router(make_ctx(pool.clone(), Arc::new(StaticListing(""))));

    let payload = json!({
        "sessionId": sid,
        "participants": [{
            "callSign": "N2SWJ",
            "displayName": "Scott",
            "location": "Greer SC",
            "announce": true
        }]
    });
    let res = app
        .oneshot(
            Request::post("/pre-checkin/process")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"], 1);
    assert_eq!(body["errorCount"], 0);
    assert_eq!(body["results"][0]["callSign"], "N2SWJ");
    assert_eq!(body["results"][0]["operatorCreated"], true);
    assert_eq!(body["results"][0]["hasEnrichmentData"], false);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM session_participants WHERE session_id = ?")
            .bind(sid)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn process_with_empty_selection_is_bad_request() {
    let pool = setup_pool().await;
    let sid = db::insert_session(&pool, "Monday Net", None).await.unwrap();
    let app = router(make_ctx(pool, Arc::new(StaticListing(""))));

    let payload = json!({ "sessionId": sid, "participants": [] });
    let res = app
        .oneshot(
            Request::post("/pre-checkin/process")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = body_json(res).await;
    assert_eq!(body["success"], false);
}
