//! Router tests through `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::{NaiveTime, Weekday};
use meetpoint_appointments::memory::InMemoryOutbox;
use meetpoint_appointments::{
    AppointmentEngine, AvailabilityWindow, InMemoryBackend, LifecycleEnvironment, Listing, MeetingPointId,
    ProductId, UserId,
};
use meetpoint_testing::manual_clock;
use meetpoint_web::{ACTOR_HEADER, AppState, CORRELATION_ID_HEADER, router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    listing: Listing,
    buyer: UserId,
}

impl Harness {
    fn new(stock: u32) -> Self {
        let backend = InMemoryBackend::new();
        let listing = Listing {
            product_id: ProductId::new(),
            seller_id: UserId::new(),
            meeting_point_id: MeetingPointId::new(),
        };
        backend.catalog.add_listing(listing.clone()).unwrap();
        backend
            .catalog
            .add_availability(
                listing.seller_id,
                AvailabilityWindow {
                    weekday: Weekday::Thu,
                    start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                },
            )
            .unwrap();
        backend.stock.set(listing.product_id, stock).unwrap();

        let env = LifecycleEnvironment::new(Arc::new(manual_clock()), Arc::new(InMemoryOutbox::new()));
        let engine = AppointmentEngine::new(backend.ports(), env);
        Self {
            app: router(AppState::new(Arc::new(engine))),
            listing,
            buyer: UserId::new(),
        }
    }

    fn seller(&self) -> UserId {
        self.listing.seller_id
    }

    async fn send(&self, method: &str, uri: &str, actor: Option<UserId>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header(ACTOR_HEADER, actor.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    fn create_body(&self, time: &str, quantity: u32) -> Value {
        json!({
            "productId": self.listing.product_id,
            "buyerId": self.buyer,
            "scheduledDate": "2025-01-02",
            "scheduledTime": time,
            "requestedQuantity": quantity,
            "unitPriceSnapshot": 1250,
        })
    }

    async fn create(&self, time: &str, quantity: u32) -> String {
        let (status, body) = self
            .send("POST", "/appointments", Some(self.buyer), Some(self.create_body(time, quantity)))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    fn rating_body(&self, id: &str, direction: &str, score: u8) -> (UserId, Value) {
        let (rater, rated) = if direction == "buyer_to_seller" {
            (self.buyer, self.seller())
        } else {
            (self.seller(), self.buyer)
        };
        (
            rater,
            json!({
                "appointmentId": id,
                "raterId": rater,
                "ratedId": rated,
                "direction": direction,
                "score": score,
                "comment": "smooth exchange",
            }),
        )
    }
}

#[tokio::test]
async fn full_exchange_over_http() {
    let h = Harness::new(1);
    let id = h.create("10:00", 1).await;

    let (status, body) = h
        .send("PUT", &format!("/appointments/{id}/confirm"), Some(h.seller()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "confirmed");

    let (rater, rating) = h.rating_body(&id, "buyer_to_seller", 4);
    let (status, body) = h.send("POST", "/ratings", Some(rater), Some(rating)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointmentCompleted"], false);

    let (rater, rating) = h.rating_body(&id, "seller_to_buyer", 5);
    let (status, body) = h.send("POST", "/ratings", Some(rater), Some(rating)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointmentCompleted"], true);
    assert_eq!(body["appointment"]["state"], "completed");

    let (status, detail) = h.send("GET", &format!("/appointments/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["total"], 1250);
    assert_eq!(detail["ratings"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn conflicts_carry_distinct_codes() {
    let h = Harness::new(1);
    let id = h.create("10:00", 2).await;

    let (status, body) = h
        .send("PUT", &format!("/appointments/{id}/confirm"), Some(h.seller()), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");

    let (status, _) = h
        .send(
            "PUT",
            &format!("/appointments/{id}/reject"),
            Some(h.seller()),
            Some(json!({"reason": "Out of stock"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h
        .send("PUT", &format!("/appointments/{id}/confirm"), Some(h.seller()), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn empty_reject_reason_is_bad_request() {
    let h = Harness::new(1);
    let id = h.create("10:00", 1).await;

    let (status, body) = h
        .send(
            "PUT",
            &format!("/appointments/{id}/reject"),
            Some(h.seller()),
            Some(json!({"reason": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn duplicate_rating_is_conflict() {
    let h = Harness::new(1);
    let id = h.create("10:00", 1).await;
    h.send("PUT", &format!("/appointments/{id}/confirm"), Some(h.seller()), None)
        .await;

    let (rater, rating) = h.rating_body(&id, "buyer_to_seller", 4);
    let (status, _) = h.send("POST", "/ratings", Some(rater), Some(rating.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = h.send("POST", "/ratings", Some(rater), Some(rating)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_RATING");
}

#[tokio::test]
async fn rating_before_confirmation_is_conflict() {
    let h = Harness::new(1);
    let id = h.create("10:00", 1).await;

    let (rater, rating) = h.rating_body(&id, "buyer_to_seller", 4);
    let (status, body) = h.send("POST", "/ratings", Some(rater), Some(rating)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "RATING_NOT_ALLOWED");
}

#[tokio::test]
async fn slot_outside_availability_is_rejected() {
    let h = Harness::new(1);
    let (status, body) = h
        .send("POST", "/appointments", Some(h.buyer), Some(h.create_body("21:00", 1)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unparseable_bodies_are_validation_errors() {
    let h = Harness::new(1);

    let mut bad_time = h.create_body("10:00", 1);
    bad_time["scheduledTime"] = json!("25:99");
    let mut negative = h.create_body("10:00", 1);
    negative["requestedQuantity"] = json!(-1);
    let mut missing = h.create_body("10:00", 1);
    missing.as_object_mut().unwrap().remove("productId");

    for body in [bad_time, negative, missing] {
        let (status, body) = h.send("POST", "/appointments", Some(h.buyer), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["message"].is_string());
    }

    let id = h.create("10:00", 1).await;
    let (rater, mut rating) = h.rating_body(&id, "buyer_to_seller", 4);
    rating["score"] = json!(300);
    let (status, body) = h.send("POST", "/ratings", Some(rater), Some(rating)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn quantity_beyond_storable_range_is_rejected() {
    let h = Harness::new(1);
    let mut body = h.create_body("10:00", 1);
    body["requestedQuantity"] = json!(3_000_000_000_u32);
    body["unitPriceSnapshot"] = json!(1);

    let (status, body) = h.send("POST", "/appointments", Some(h.buyer), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_path_and_query_are_validation_errors() {
    let h = Harness::new(1);

    let (status, body) = h.send("GET", "/appointments/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = h
        .send("GET", &format!("/appointments?role=admin&userId={}", h.buyer), None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn caller_identity_is_enforced() {
    let h = Harness::new(1);

    let (status, _) = h
        .send("POST", "/appointments", None, Some(h.create_body("10:00", 1)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .send("POST", "/appointments", Some(UserId::new()), Some(h.create_body("10:00", 1)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let id = h.create("10:00", 1).await;
    let (status, body) = h
        .send("PUT", &format!("/appointments/{id}/confirm"), Some(h.buyer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn listing_and_reputation() {
    let h = Harness::new(5);
    let first = h.create("09:00", 1).await;
    let second = h.create("10:00", 1).await;
    h.send("PUT", &format!("/appointments/{second}/confirm"), Some(h.seller()), None)
        .await;

    let (status, body) = h
        .send(
            "GET",
            &format!("/appointments?role=seller&userId={}&state=requested", h.seller()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|a| a["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![first.as_str()]);

    let (_, body) = h
        .send("GET", &format!("/appointments?role=buyer&userId={}", h.buyer), None, None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (rater, rating) = h.rating_body(&second, "buyer_to_seller", 3);
    h.send("POST", "/ratings", Some(rater), Some(rating)).await;

    let (status, body) = h
        .send(
            "GET",
            &format!("/users/{}/reputation?direction=buyer_to_seller", h.seller()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["average"], 3.0);
}

#[tokio::test]
async fn unknown_appointment_is_not_found() {
    let h = Harness::new(1);
    let (status, body) = h
        .send("GET", &format!("/appointments/{}", uuid::Uuid::new_v4()), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn health_and_readiness() {
    let h = Harness::new(1);
    let (status, body) = h.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));

    let (status, body) = h.send("GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"][0]["component"], "appointment_store");
}

#[tokio::test]
async fn responses_echo_correlation_id() {
    let h = Harness::new(1);
    let id = uuid::Uuid::new_v4();
    let request = Request::builder()
        .uri("/health")
        .header(CORRELATION_ID_HEADER, id.to_string())
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(CORRELATION_ID_HEADER).unwrap().to_str().unwrap(),
        id.to_string()
    );
}
