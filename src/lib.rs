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

//! # Ridematch Demo
//!
//! This library provides a ride dispatch engine that matches ride requests
//! from passengers to available drivers according to per-driver acceptance
//! preferences, tracks each ride through a small lifecycle, and fans state
//! changes out to connected clients in real time.
//!
//! ## Core Components
//!
//! - [`Engine`]: Assignment coordinator owning the ride lifecycle and the
//!   race-safe accept protocol
//! - [`Ride`] / [`Driver`]: The two entities and their state machines
//! - [`eligibility`]: Pure predicate deciding whether a driver may act on
//!   a ride
//! - [`NotificationBus`] / [`EventGateway`]: Room-based publish/subscribe
//!   delivering [`DispatchEvent`]s to driver and passenger connections
//! - [`DispatchError`]: Error taxonomy (validation, not-found, conflict)
//!
//! ## Example
//!
//! ```
//! use ridematch_demo_rs::{DriverRegistration, Engine, Preferences, RideRequest};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//!
//! let driver = engine
//!     .add_driver(DriverRegistration {
//!         name: "D1".to_string(),
//!         preferences: Preferences::default(),
//!         current_location: None,
//!     })
//!     .unwrap();
//!
//! let ride = engine
//!     .create_ride(RideRequest {
//!         pickup: "Central Station".to_string(),
//!         dropoff: "Airport".to_string(),
//!         distance: dec!(5),
//!         fare: dec!(150),
//!         traffic_level: Default::default(),
//!     })
//!     .unwrap();
//!
//! let (ride, driver) = engine.accept_ride(ride.id, driver.id).unwrap();
//! assert_eq!(ride.driver, Some(driver.id));
//! ```
//!
//! ## Thread Safety
//!
//! Operations on unrelated rides run fully concurrently. Concurrent accepts
//! on one ride are serialized by that ride's guard: exactly one caller
//! wins, the rest observe a conflict error with no partial effect.

mod base;
pub mod bus;
mod driver;
pub mod eligibility;
mod engine;
pub mod error;
mod events;
mod gateway;
mod ride;

pub use base::{ConnectionId, DriverId, RideId};
pub use bus::{NotificationBus, Room};
pub use driver::{Driver, DriverRegistration, DriverStatus, Preferences};
pub use eligibility::is_eligible;
pub use engine::{Engine, EngineConfig};
pub use error::{DispatchError, ErrorKind};
pub use events::DispatchEvent;
pub use gateway::{Connection, EventGateway};
pub use ride::{Ride, RideRequest, RideStatus, TrafficLevel};
