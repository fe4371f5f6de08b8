//! REST + SSE demo server for the dispatch engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /rides` - Create a ride request
//! - `GET /rides` - List all rides
//! - `GET /rides/pending` - List rides waiting for a driver
//! - `POST /rides/{id}/accept` - Accept a ride as a driver (race-safe)
//! - `POST /rides/{id}/reject` - Reject a ride as a driver
//! - `POST /rides/{id}/complete` - Complete an accepted ride
//! - `POST /rides/{id}/cancel` - Cancel a pending or accepted ride
//! - `POST /drivers` - Register a driver
//! - `GET /drivers` - List all drivers
//! - `DELETE /drivers/{id}` - Remove a driver (cascade-cancels its ride)
//! - `GET /events/driver/{id}` - SSE stream for a driver-side client
//! - `GET /events/ride/{id}` - SSE stream for a passenger-side client
//!
//! ## Example Usage
//!
//! ```bash
//! # Register a driver
//! curl -X POST http://localhost:3000/drivers \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "D1", "preferences": {"max_trip_distance": "10", "minimum_fare": "100", "avoid_traffic": false}}'
//!
//! # Create a ride
//! curl -X POST http://localhost:3000/rides \
//!   -H "Content-Type: application/json" \
//!   -d '{"pickup": "Central Station", "dropoff": "Airport", "distance": "5", "fare": "150"}'
//!
//! # Accept it
//! curl -X POST http://localhost:3000/rides/1/accept \
//!   -H "Content-Type: application/json" -d '{"driver_id": 1}'
//!
//! # Watch driver-side events
//! curl -N http://localhost:3000/events/driver/1
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use futures::stream::Stream;
use ridematch_demo_rs::{
    Driver, DriverId, DriverRegistration, Engine, EventGateway, Ride, RideId, RideRequest,
    error::{DispatchError, ErrorKind},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

/// Request body naming the acting driver for accept/reject.
#[derive(Debug, Deserialize)]
pub struct DriverAction {
    pub driver_id: u32,
}

/// Response body for accept: the post-transition pair.
#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub ride: Ride,
    pub driver: Driver,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the dispatch engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub gateway: EventGateway,
}

// === Error Handling ===

/// Wrapper for converting `DispatchError` into HTTP responses.
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
        let code = match &self.0 {
            DispatchError::MissingPickup => "MISSING_PICKUP",
            DispatchError::MissingDropoff => "MISSING_DROPOFF",
            DispatchError::InvalidDistance => "INVALID_DISTANCE",
            DispatchError::InvalidFare => "INVALID_FARE",
            DispatchError::MissingDriverName => "MISSING_DRIVER_NAME",
            DispatchError::InvalidPreference => "INVALID_PREFERENCE",
            DispatchError::RideNotFound => "RIDE_NOT_FOUND",
            DispatchError::DriverNotFound => "DRIVER_NOT_FOUND",
            DispatchError::RideNotPending => "RIDE_NOT_PENDING",
            DispatchError::RideNotAccepted => "RIDE_NOT_ACCEPTED",
            DispatchError::RideTerminal => "RIDE_TERMINAL",
            DispatchError::DriverNotAvailable => "DRIVER_NOT_AVAILABLE",
            DispatchError::DriverNotEligible => "DRIVER_NOT_ELIGIBLE",
            DispatchError::DriverAssigned => "DRIVER_ASSIGNED",
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Ride Handlers ===

/// POST /rides - Create a new ride request.
async fn create_ride(
    State(state): State<AppState>,
    Json(request): Json<RideRequest>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let ride = state.engine.create_ride(request)?;
    Ok((StatusCode::CREATED, Json(ride)))
}

/// GET /rides - List all rides.
async fn list_rides(State(state): State<AppState>) -> Json<Vec<Ride>> {
    let mut rides = state.engine.rides();
    rides.sort_by_key(|ride| ride.id.0);
    Json(rides)
}

/// GET /rides/pending - List rides waiting for a driver.
async fn list_pending_rides(State(state): State<AppState>) -> Json<Vec<Ride>> {
    let mut rides = state.engine.pending_rides();
    rides.sort_by_key(|ride| ride.id.0);
    Json(rides)
}

/// POST /rides/{id}/accept - Race-safe accept by one driver.
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

/// POST /rides/{id}/reject - Record a driver's rejection.
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

/// POST /rides/{id}/complete - Complete an accepted ride.
async fn complete_ride(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Ride>, AppError> {
    let (ride, _driver) = state.engine.complete_ride(RideId(id))?;
    Ok(Json(ride))
}

/// POST /rides/{id}/cancel - Cancel a pending or accepted ride.
async fn cancel_ride(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Ride>, AppError> {
    let (ride, _driver) = state.engine.cancel_ride(RideId(id))?;
    Ok(Json(ride))
}

// === Driver Handlers ===

/// POST /drivers - Register a driver.
async fn add_driver(
    State(state): State<AppState>,
    Json(registration): Json<DriverRegistration>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    let driver = state.engine.add_driver(registration)?;
    Ok((StatusCode::CREATED, Json(driver)))
}

/// GET /drivers - List all drivers.
async fn list_drivers(State(state): State<AppState>) -> Json<Vec<Driver>> {
    let mut drivers = state.engine.drivers();
    drivers.sort_by_key(|driver| driver.id.0);
    Json(drivers)
}

/// DELETE /drivers/{id} - Remove a driver, cascade-cancelling its ride.
async fn remove_driver(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<StatusCode, AppError> {
    state.engine.remove_driver(DriverId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

// === Event Streams ===

/// Bridges one gateway connection into an SSE stream.
///
/// A forwarding thread owns the connection handle; when the client goes
/// away the tokio side closes, the thread exits, and dropping the handle
/// removes the connection from every room.
fn event_stream(
    gateway: EventGateway,
    join: impl FnOnce(&EventGateway, &ridematch_demo_rs::Connection),
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let connection = gateway.connect();
    join(&gateway, &connection);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        while let Ok(event) = connection.receiver().recv() {
            let Ok(json) = serde_json::to_string(&*event) else {
                continue;
            };
            if tx.send(json).is_err() {
                break; // client went away
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|json| {
            (Ok(Event::default().event("dispatch").data(json)), rx)
        })
    });
    Sse::new(stream)
}

/// GET /events/driver/{id} - Driver-side event stream.
async fn driver_events(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_stream(state.gateway.clone(), move |gateway, connection| {
        gateway.join_driver_room(connection, DriverId(id));
    })
}

/// GET /events/ride/{id} - Passenger-side event stream.
async fn ride_events(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_stream(state.gateway.clone(), move |gateway, connection| {
        gateway.join_passenger_room(connection, RideId(id));
    })
}

/// GET /health - Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/rides", post(create_ride).get(list_rides))
        .route("/rides/pending", get(list_pending_rides))
        .route("/rides/{id}/accept", post(accept_ride))
        .route("/rides/{id}/reject", post(reject_ride))
        .route("/rides/{id}/complete", post(complete_ride))
        .route("/rides/{id}/cancel", post(cancel_ride))
        .route("/drivers", post(add_driver).get(list_drivers))
        .route("/drivers/{id}", delete(remove_driver))
        .route("/events/driver/{id}", get(driver_events))
        .route("/events/ride/{id}", get(ride_events))
        .route("/health", get(health))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let engine = Arc::new(Engine::new());
    let state = AppState {
        gateway: engine.gateway(),
        engine,
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Dispatch API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST   /rides               - Create a ride request");
    println!("  GET    /rides               - List all rides");
    println!("  GET    /rides/pending       - List pending rides");
    println!("  POST   /rides/:id/accept    - Accept a ride");
    println!("  POST   /rides/:id/reject    - Reject a ride");
    println!("  POST   /rides/:id/complete  - Complete a ride");
    println!("  POST   /rides/:id/cancel    - Cancel a ride");
    println!("  POST   /drivers             - Register a driver");
    println!("  GET    /drivers             - List all drivers");
    println!("  DELETE /drivers/:id         - Remove a driver");
    println!("  GET    /events/driver/:id   - Driver event stream (SSE)");
    println!("  GET    /events/ride/:id     - Passenger event stream (SSE)");

    axum::serve(listener, app).await.unwrap();
}
