// Integration tests for LifeLink Match

use actix_web::{http::StatusCode, test, web, App};
use lifelink_match::core::{Engine, EngineError, MatchQuery, SortKey};
use async_trait::async_trait;
use lifelink_match::models::{
    ChannelEvent, Decision, Donor, EventKind, NotificationKind, Recipient, RequestStatus,
};
use lifelink_match::routes::{configure_routes, AppState};
use lifelink_match::services::{
    BusError, ChannelKey, EventBus, FailPoint, LinearModel, LocalBus, MemoryStore,
};
use lifelink_match::haversine_distance;
use serde_json::{json, Value};
use std::sync::Arc;

struct Harness {
    store: MemoryStore,
    bus: Arc<LocalBus>,
    engine: Engine,
}

/// Engine over an empty memory store with `score = a + 10d + 0.1u`
fn harness() -> Harness {
    let store = MemoryStore::new();
    let bus = Arc::new(LocalBus::default());
    let model = Arc::new(LinearModel::new([1.0, 10.0, 0.1], 0.0));
    let engine = Engine::new(Arc::new(store.clone()), bus.clone(), model);
    Harness { store, bus, engine }
}

fn donor(name: &str, blood_type: &str, organ: &str, age: i32, lat: f64, lon: f64) -> Donor {
    Donor {
        id: 0,
        full_name: name.to_string(),
        email: format!("{}@donors.example.org", name.to_lowercase()),
        blood_type: Some(blood_type.to_string()),
        organ: organ.to_string(),
        age,
        latitude: lat,
        longitude: lon,
    }
}

fn recipient(name: &str, organ: &str, urgency: i32, age: i32) -> Recipient {
    Recipient {
        id: 0,
        full_name: name.to_string(),
        email: format!("{}@recipients.example.org", name.to_lowercase()),
        blood_type: Some("A+".to_string()),
        needed_organ: organ.to_string(),
        urgency_level: Some(urgency),
        age,
        latitude: 0.0,
        longitude: 0.0,
    }
}

/// One recipient needing a kidney and one matching donor
async fn seeded_pair(h: &Harness) -> (Donor, Recipient) {
    let r = h.store.insert_recipient(recipient("Riley", "kidney", 8, 40)).await;
    let d = h.store.insert_donor(donor("Dana", "O-", "kidney", 42, 0.0, 1.0)).await;
    (d, r)
}

#[tokio::test]
async fn test_end_to_end_score_for_reference_pair() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;

    let matches = h.engine.finder().find_matches(r.id, None).await.unwrap();

    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    let distance = haversine_distance(0.0, 0.0, 0.0, 1.0);
    let expected = 1.0 / 3.0 + 10.0 / (1.0 + distance) + 0.1 * 8.0;

    assert_eq!(m.donor_id, d.id);
    assert!((m.distance - 111.19).abs() < 0.01);
    assert!((m.compatibility_score - expected).abs() < 1e-12);
    assert_eq!(m.urgency_score, 8);
    assert_eq!(m.request_status, None);
}

#[tokio::test]
async fn test_no_donor_for_organ_is_empty_not_error() {
    let h = harness();
    let r = h.store.insert_recipient(recipient("Riley", "heart", 5, 40)).await;
    h.store.insert_donor(donor("Dana", "O-", "kidney", 42, 0.0, 1.0)).await;

    let matches = h.engine.finder().find_matches(r.id, None).await.unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn test_unknown_recipient_is_not_found() {
    let h = harness();
    let result = h.engine.finder().find_matches(99, None).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_bad_blood_type_excludes_only_that_pair() {
    let h = harness();
    let r = h.store.insert_recipient(recipient("Riley", "kidney", 5, 40)).await;
    let good = h.store.insert_donor(donor("Dana", "B+", "kidney", 41, 0.0, 0.5)).await;
    h.store.insert_donor(donor("Eli", "Q+", "kidney", 41, 0.0, 0.5)).await;

    let matches = h.engine.finder().find_matches(r.id, None).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].donor_id, good.id);
}

#[tokio::test]
async fn test_query_filters_then_sorts() {
    let h = harness();
    let r = h.store.insert_recipient(recipient("Riley", "liver", 5, 40)).await;
    let near = h.store.insert_donor(donor("Ann", "A+", "liver", 70, 0.0, 0.1)).await;
    let mid = h.store.insert_donor(donor("Ben", "A+", "liver", 40, 0.0, 1.0)).await;
    h.store.insert_donor(donor("Cal", "A+", "liver", 40, 0.0, 10.0)).await;

    let query = MatchQuery {
        sort_by: SortKey::Distance,
        min_score: None,
        max_distance: Some(200.0),
    };
    let matches = h.engine.finder().find_matches(r.id, Some(&query)).await.unwrap();

    let ids: Vec<i64> = matches.iter().map(|m| m.donor_id).collect();
    assert_eq!(ids, vec![near.id, mid.id]);
    assert!(matches.iter().all(|m| m.distance <= 200.0));
}

#[tokio::test]
async fn test_matches_carry_latest_request_status() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;

    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();
    h.engine
        .lifecycle()
        .resolve_request(request.id, Decision::Decline)
        .await
        .unwrap();

    let matches = h.engine.finder().find_matches(r.id, None).await.unwrap();
    assert_eq!(matches[0].request_status, Some(RequestStatus::Declined));
}

#[tokio::test]
async fn test_duplicate_create_conflicts_with_existing_status() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;

    let first = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();
    assert_eq!(first.status, RequestStatus::Pending);

    match h.engine.lifecycle().create_request(d.id, r.id).await {
        Err(EngineError::Conflict { request_id, existing }) => {
            assert_eq!(request_id, first.id);
            assert_eq!(existing, RequestStatus::Pending);
        }
        other => panic!("expected conflict, got {:?}", other),
    }

    assert_eq!(h.store.counts().await.requests, 1);
}

#[tokio::test]
async fn test_create_for_missing_party_is_not_found() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;

    assert!(matches!(
        h.engine.lifecycle().create_request(d.id, 404).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        h.engine.lifecycle().create_request(404, r.id).await,
        Err(EngineError::NotFound(_))
    ));
    assert_eq!(h.store.counts().await.requests, 0);
}

#[tokio::test]
async fn test_concurrent_creates_yield_exactly_one_request() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.lifecycle().create_request(d.id, r.id).await })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(EngineError::Conflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(h.store.counts().await.requests, 1);
}

#[tokio::test]
async fn test_double_accept_inserts_one_match() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();

    let first = h
        .engine
        .lifecycle()
        .resolve_request(request.id, Decision::Accept)
        .await
        .unwrap();
    assert_eq!(first.status, RequestStatus::Accepted);
    assert!(!first.already_resolved);
    let record = first.match_record.unwrap();
    assert_eq!(record.donor_name, "Dana");
    assert_eq!(record.recipient_name, "Riley");
    assert_eq!(record.organ, "kidney");

    let second = h
        .engine
        .lifecycle()
        .resolve_request(request.id, Decision::Accept)
        .await
        .unwrap();
    assert_eq!(second.status, RequestStatus::Accepted);
    assert!(second.already_resolved);
    assert!(second.match_record.is_none());

    assert_eq!(h.store.matches().await.len(), 1);
}

#[tokio::test]
async fn test_decline_after_accept_keeps_accepted() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();

    h.engine
        .lifecycle()
        .resolve_request(request.id, Decision::Accept)
        .await
        .unwrap();
    let again = h
        .engine
        .lifecycle()
        .resolve_request(request.id, Decision::Decline)
        .await
        .unwrap();

    assert_eq!(again.status, RequestStatus::Accepted);
    assert!(again.already_resolved);
}

#[tokio::test]
async fn test_decline_writes_no_match() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();

    let resolution = h
        .engine
        .lifecycle()
        .resolve_request(request.id, Decision::Decline)
        .await
        .unwrap();

    assert_eq!(resolution.status, RequestStatus::Declined);
    assert!(h.store.matches().await.is_empty());
}

#[tokio::test]
async fn test_resolve_missing_request_writes_nothing() {
    let h = harness();
    seeded_pair(&h).await;
    let before = h.store.counts().await;

    let result = h.engine.lifecycle().resolve_request(77, Decision::Accept).await;

    assert!(matches!(result, Err(EngineError::NotFound(_))));
    assert_eq!(h.store.counts().await, before);
}

#[tokio::test]
async fn test_failed_match_insert_rolls_back_acceptance() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();

    h.store.set_fail_point(Some(FailPoint::InsertMatch));
    let result = h
        .engine
        .lifecycle()
        .resolve_request(request.id, Decision::Accept)
        .await;
    assert!(matches!(result, Err(EngineError::Persistence(_))));

    let requests = h.store.requests().await;
    assert_eq!(requests[0].status, RequestStatus::Pending);
    assert!(h.store.matches().await.is_empty());

    h.store.set_fail_point(None);
    let retried = h
        .engine
        .lifecycle()
        .resolve_request(request.id, Decision::Accept)
        .await
        .unwrap();
    assert_eq!(retried.status, RequestStatus::Accepted);
    assert_eq!(h.store.matches().await.len(), 1);
}

#[tokio::test]
async fn test_failed_status_update_rolls_back_match() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();

    // The match is written before the status, so both must disappear
    h.store.set_fail_point(Some(FailPoint::SetRequestStatus));
    let result = h
        .engine
        .lifecycle()
        .resolve_request(request.id, Decision::Accept)
        .await;

    assert!(result.is_err());
    assert!(h.store.matches().await.is_empty());
    assert_eq!(h.store.requests().await[0].status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_failed_request_insert_stores_nothing() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;

    h.store.set_fail_point(Some(FailPoint::InsertRequest));
    let result = h.engine.lifecycle().create_request(d.id, r.id).await;

    assert!(matches!(result, Err(EngineError::Persistence(_))));
    assert_eq!(h.store.counts().await.requests, 0);
}

#[tokio::test]
async fn test_list_views_follow_lifecycle() {
    let h = harness();
    let r1 = h.store.insert_recipient(recipient("Riley", "kidney", 5, 40)).await;
    let r2 = h.store.insert_recipient(recipient("Sam", "kidney", 6, 50)).await;
    let d = h.store.insert_donor(donor("Dana", "O-", "kidney", 42, 0.0, 1.0)).await;

    let first = h.engine.lifecycle().create_request(d.id, r1.id).await.unwrap();
    h.engine.lifecycle().create_request(d.id, r2.id).await.unwrap();

    let pending = h.engine.lifecycle().list_pending_requests(d.id).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].recipient_name, "Riley");

    h.engine
        .lifecycle()
        .resolve_request(first.id, Decision::Accept)
        .await
        .unwrap();

    let pending = h.engine.lifecycle().list_pending_requests(d.id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].recipient_id, r2.id);

    let accepted = h.engine.lifecycle().list_accepted_requests(r1.id).await.unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].request_id, first.id);
    assert_eq!(accepted[0].donor_name, "Dana");
}

#[tokio::test]
async fn test_new_donor_notifies_and_publishes() {
    let h = harness();
    let r1 = h.store.insert_recipient(recipient("Riley", "kidney", 5, 40)).await;
    let r2 = h.store.insert_recipient(recipient("Sam", "kidney", 6, 50)).await;
    let other = h.store.insert_recipient(recipient("Tao", "lung", 7, 30)).await;

    let mut rx = h.bus.subscribe(&ChannelKey::recipient(r1.id));

    let written = h
        .engine
        .dispatcher()
        .notify_new_donor("kidney", "Dana")
        .await
        .unwrap();
    assert_eq!(written, 2);

    for id in [r1.id, r2.id] {
        let inbox = h.engine.dispatcher().notifications_for(id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message, "New donor available: Dana for organ: kidney");
        assert_eq!(inbox[0].kind, NotificationKind::NewDonor);
    }
    assert!(h
        .engine
        .dispatcher()
        .notifications_for(other.id)
        .await
        .unwrap()
        .is_empty());

    let event = rx.try_recv().unwrap();
    assert_eq!(event.kind, EventKind::NewDonor);
    assert_eq!(event.payload["donorName"], "Dana");
}

#[tokio::test]
async fn test_new_donor_with_no_recipients_writes_nothing() {
    let h = harness();
    let written = h
        .engine
        .dispatcher()
        .notify_new_donor("pancreas", "Dana")
        .await
        .unwrap();

    assert_eq!(written, 0);
    assert_eq!(h.store.counts().await.notifications, 0);
}

/// Bus whose every publish fails
struct BrokenBus;

#[async_trait]
impl EventBus for BrokenBus {
    async fn publish(&self, _channel: &str, _event: &ChannelEvent) -> Result<usize, BusError> {
        let err = serde_json::from_str::<Value>("{").unwrap_err();
        Err(BusError::SerializationError(err))
    }
}

#[tokio::test]
async fn test_broken_bus_never_fails_committed_work() {
    let store = MemoryStore::new();
    let model = Arc::new(LinearModel::new([1.0, 10.0, 0.1], 0.0));
    let engine = Engine::new(Arc::new(store.clone()), Arc::new(BrokenBus), model);
    let r = store.insert_recipient(recipient("Riley", "kidney", 8, 40)).await;
    let d = store.insert_donor(donor("Dana", "O-", "kidney", 42, 0.0, 1.0)).await;

    let request = engine.lifecycle().create_request(d.id, r.id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    let resolution = engine
        .lifecycle()
        .resolve_request(request.id, Decision::Accept)
        .await
        .unwrap();
    assert_eq!(resolution.status, RequestStatus::Accepted);
    assert_eq!(store.matches().await.len(), 1);

    let written = engine
        .dispatcher()
        .notify_new_donor("kidney", "Dana")
        .await
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(engine.dispatcher().notifications_for(r.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_notification_insert_is_persistence_error() {
    let h = harness();
    let (_, r) = seeded_pair(&h).await;
    let mut rx = h.bus.subscribe(&ChannelKey::recipient(r.id));
    h.store.set_fail_point(Some(FailPoint::InsertNotifications));

    let result = h.engine.dispatcher().notify_new_donor("kidney", "Dana").await;

    assert!(matches!(result, Err(EngineError::Persistence(_))));
    assert_eq!(h.store.counts().await.notifications, 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_announce_unknown_donor_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.engine.announce_donor(12).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_create_signals_donor_channel() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let mut rx = h.bus.subscribe(&ChannelKey::donor(d.id));

    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();

    let event = rx.try_recv().unwrap();
    assert_eq!(event.kind, EventKind::NewRequest);
    assert_eq!(event.payload["requestId"], request.id);
}

#[tokio::test]
async fn test_accept_signals_both_parties_by_email() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let mut donor_rx = h.bus.subscribe(&ChannelKey::email(&d.email));
    let mut recipient_rx = h.bus.subscribe(&ChannelKey::email(&r.email));

    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();
    h.engine
        .lifecycle()
        .resolve_request(request.id, Decision::Accept)
        .await
        .unwrap();

    for rx in [&mut donor_rx, &mut recipient_rx] {
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::RequestUpdate);
        assert_eq!(event.payload["status"], "accepted");
        assert_eq!(event.payload["donorName"], "Dana");
        assert_eq!(event.payload["recipientName"], "Riley");
        assert_eq!(event.payload["organ"], "kidney");
    }
}

#[tokio::test]
async fn test_decline_sends_no_update() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let mut donor_rx = h.bus.subscribe(&ChannelKey::email(&d.email));

    let request = h.engine.lifecycle().create_request(d.id, r.id).await.unwrap();
    h.engine
        .lifecycle()
        .resolve_request(request.id, Decision::Decline)
        .await
        .unwrap();

    assert!(donor_rx.try_recv().is_err());
}

#[actix_web::test]
async fn test_http_request_lifecycle() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState {
                engine: Arc::new(h.engine.clone()),
            }))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/requests")
        .set_json(json!({ "donorId": d.id, "recipientId": r.id }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let request_id = body["request"]["id"].as_i64().unwrap();
    assert_eq!(body["request"]["status"], "pending");

    let req = test::TestRequest::post()
        .uri("/api/v1/requests")
        .set_json(json!({ "donorId": d.id, "recipientId": r.id }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["status_code"], 409);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/requests/{}/resolve", request_id))
        .set_json(json!({ "action": "maybe" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/requests/{}/resolve", request_id))
        .set_json(json!({ "action": "accept" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["match"]["donorName"], "Dana");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/recipients/{}/accepted", r.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["requests"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_http_find_matches() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState {
                engine: Arc::new(h.engine.clone()),
            }))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/recipients/{}/matches?sortBy=distance&maxDistance=500", r.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total_results"], 1);
    assert_eq!(body["matches"][0]["donorId"], d.id);
    assert_eq!(body["matches"][0]["distance"], 111.19);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/recipients/{}/matches?sortBy=height", r.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let req = test::TestRequest::get()
        .uri("/api/v1/recipients/999/matches")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[actix_web::test]
async fn test_http_announce_and_inbox() {
    let h = harness();
    let (d, r) = seeded_pair(&h).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState {
                engine: Arc::new(h.engine.clone()),
            }))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/donors/{}/announce", d.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["notified"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/notifications/{}", r.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["notifications"][0]["type"], "new_donor");
}

#[actix_web::test]
async fn test_http_health() {
    let h = harness();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState {
                engine: Arc::new(h.engine.clone()),
            }))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["scoringModel"], "linear");
}
