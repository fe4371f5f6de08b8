// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Integration tests for the REST API server with concurrent requests.
//!
//! These tests verify the HTTP status mapping of the error taxonomy and
//! that the accept race resolves to a single winner over the wire.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use reqwest::Client;
use ridematch_demo_rs::{
    Driver, DriverId, DriverRegistration, Engine, Ride, RideId, RideRequest,
    error::{DispatchError, ErrorKind},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

// === DTOs (duplicated from example for test isolation) ===

#[derive(Debug, Deserialize, Serialize)]
pub struct DriverAction {
    pub driver_id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub ride: Ride,
    pub driver: Driver,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Server Setup ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub struct AppError(DispatchError);

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: format!("{:?}", self.0).to_uppercase(),
            }),
        )
            .into_response()
    }
}

async fn create_ride(
    State(state): State<AppState>,
    Json(request): Json<RideRequest>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let ride = state.engine.create_ride(request)?;
    Ok((StatusCode::CREATED, Json(ride)))
}

async fn list_pending_rides(State(state): State<AppState>) -> Json<Vec<Ride>> {
    Json(state.engine.pending_rides())
}

async fn accept_ride(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(action): Json<DriverAction>,
) -> Result<Json<AssignmentResponse>, AppError> {
    let (ride, driver) = state
        .engine
        .accept_ride(RideId(id), DriverId(action.driver_id))?;
    Ok(Json(AssignmentResponse { ride, driver }))
}

async fn reject_ride(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(action): Json<DriverAction>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .engine
        .reject_ride(RideId(id), DriverId(action.driver_id))?;
    Ok(Json(ride))
}

async fn complete_ride(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Ride>, AppError> {
    let (ride, _driver) = state.engine.complete_ride(RideId(id))?;
    Ok(Json(ride))
}

async fn cancel_ride(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Ride>, AppError> {
    let (ride, _driver) = state.engine.cancel_ride(RideId(id))?;
    Ok(Json(ride))
}

async fn add_driver(
    State(state): State<AppState>,
    Json(registration): Json<DriverRegistration>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    let driver = state.engine.add_driver(registration)?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn remove_driver(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<StatusCode, AppError> {
    state.engine.remove_driver(DriverId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/rides", post(create_ride))
        .route("/rides/pending", get(list_pending_rides))
        .route("/rides/{id}/accept", post(accept_ride))
        .route("/rides/{id}/reject", post(reject_ride))
        .route("/rides/{id}/complete", post(complete_ride))
        .route("/rides/{id}/cancel", post(cancel_ride))
        .route("/drivers", post(add_driver))
        .route("/drivers/{id}", delete(remove_driver))
        .with_state(state)
}

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    engine: Arc<Engine>,
}

impl TestServer {
    async fn new() -> Self {
        let engine = Arc::new(Engine::new());
        let state = AppState {
            engine: engine.clone(),
        };

        let app = create_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/rides/pending", base_url);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
            }
        }

        TestServer { base_url, engine }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn ride_body() -> serde_json::Value {
    json!({
        "pickup": "Central Station",
        "dropoff": "Airport",
        "distance": "5",
        "fare": "150"
    })
}

fn driver_body(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "preferences": {
            "max_trip_distance": "10",
            "minimum_fare": "100",
            "avoid_traffic": false
        }
    })
}

// === Tests ===
// These tests are ignored in CI due to connection issues on some platforms.
// Run manually with: cargo test --test server_test -- --ignored

/// Error taxonomy maps onto HTTP status codes: validation 400, unknown
/// ids 404, lifecycle conflicts 409.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn status_codes_follow_error_taxonomy() {
    let server = TestServer::new().await;
    let client = Client::new();

    // Validation failure: empty pickup.
    let response = client
        .post(server.url("/rides"))
        .json(&json!({"pickup": "", "dropoff": "B", "distance": "5", "fare": "150"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown ride.
    let response = client
        .post(server.url("/rides/999/accept"))
        .json(&DriverAction { driver_id: 1 })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Conflict: cancel twice.
    let response = client
        .post(server.url("/rides"))
        .json(&ride_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let ride: Ride = response.json().await.unwrap();

    let cancel_url = server.url(&format!("/rides/{}/cancel", ride.id.0));
    let response = client.post(&cancel_url).send().await.unwrap();
    assert!(response.status().is_success());
    let response = client.post(&cancel_url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let error: ErrorResponse = response.json().await.unwrap();
    assert!(!error.error.is_empty());
}

/// The full lifecycle over HTTP: register, create, accept, complete.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn lifecycle_round_trip() {
    let server = TestServer::new().await;
    let client = Client::new();

    let driver: Driver = client
        .post(server.url("/drivers"))
        .json(&driver_body("D1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ride: Ride = client
        .post(server.url("/rides"))
        .json(&ride_body())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let pending: Vec<Ride> = client
        .get(server.url("/rides/pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let assignment: AssignmentResponse = client
        .post(server.url(&format!("/rides/{}/accept", ride.id.0)))
        .json(&DriverAction {
            driver_id: driver.id.0,
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(assignment.ride.driver, Some(driver.id));

    let response = client
        .post(server.url(&format!("/rides/{}/complete", ride.id.0)))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let pending: Vec<Ride> = client
        .get(server.url("/rides/pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pending.is_empty());
}

/// Many drivers accept the same ride concurrently over HTTP; exactly
/// one gets 200, the rest get 409.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_http_accepts_single_winner() {
    let server = TestServer::new().await;
    let client = Client::new();

    const NUM_DRIVERS: usize = 50;

    let mut driver_ids = Vec::with_capacity(NUM_DRIVERS);
    for i in 0..NUM_DRIVERS {
        let driver: Driver = client
            .post(server.url("/drivers"))
            .json(&driver_body(&format!("D{i}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        driver_ids.push(driver.id.0);
    }

    let ride: Ride = client
        .post(server.url("/rides"))
        .json(&ride_body())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let start = Instant::now();
    let mut handles = Vec::with_capacity(NUM_DRIVERS);
    for driver_id in driver_ids {
        let client = client.clone();
        let url = server.url(&format!("/rides/{}/accept", ride.id.0));

        handles.push(tokio::spawn(async move {
            let response = client
                .post(&url)
                .json(&DriverAction { driver_id })
                .send()
                .await
                .unwrap();
            response.status()
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles).await;
    let elapsed = start.elapsed();

    let winners = results
        .iter()
        .filter(|r| r.as_ref().unwrap().is_success())
        .count();
    let conflicts = results
        .iter()
        .filter(|r| *r.as_ref().unwrap() == StatusCode::CONFLICT)
        .count();

    println!(
        "Accept race: {} requests in {:?}, {} winner, {} conflicts",
        NUM_DRIVERS, elapsed, winners, conflicts
    );

    assert_eq!(winners, 1, "Exactly one accept should win");
    assert_eq!(conflicts, NUM_DRIVERS - 1, "Losers should see conflicts");

    let stored = server.engine.get_ride(ride.id).unwrap();
    assert!(stored.driver.is_some());
}

/// Mixed create/accept/reject load across many rides stays consistent.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn stress_mixed_operations() {
    let server = TestServer::new().await;
    let client = Client::new();

    const NUM_RIDES: usize = 100;
    const NUM_DRIVERS: usize = 20;

    for i in 0..NUM_DRIVERS {
        let response = client
            .post(server.url("/drivers"))
            .json(&driver_body(&format!("D{i}")))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    // Create rides concurrently.
    let mut handles = Vec::with_capacity(NUM_RIDES);
    for _ in 0..NUM_RIDES {
        let client = client.clone();
        let url = server.url("/rides");
        handles.push(tokio::spawn(async move {
            let response = client.post(&url).json(&ride_body()).send().await.unwrap();
            let ride: Ride = response.json().await.unwrap();
            ride.id.0
        }));
    }
    let ride_ids: Vec<u32> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(ride_ids.len(), NUM_RIDES);

    // Every driver races over every ride.
    let mut handles = Vec::new();
    for driver_id in 1..=NUM_DRIVERS as u32 {
        let client = client.clone();
        let urls: Vec<String> = ride_ids
            .iter()
            .map(|id| server.url(&format!("/rides/{}/accept", id)))
            .collect();

        handles.push(tokio::spawn(async move {
            let mut wins = 0usize;
            for url in urls {
                let response = client
                    .post(&url)
                    .json(&DriverAction { driver_id })
                    .send()
                    .await
                    .unwrap();
                if response.status().is_success() {
                    wins += 1;
                }
            }
            wins
        }));
    }

    let wins: usize = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .sum();

    // Each driver can win at most once (nobody completes rides here).
    assert_eq!(wins, NUM_DRIVERS);

    // Accepted rides all name distinct drivers.
    let accepted: Vec<_> = server
        .engine
        .rides()
        .into_iter()
        .filter(|r| r.driver.is_some())
        .collect();
    assert_eq!(accepted.len(), NUM_DRIVERS);
    let distinct: std::collections::HashSet<_> =
        accepted.iter().map(|r| r.driver.unwrap()).collect();
    assert_eq!(distinct.len(), NUM_DRIVERS);
}
