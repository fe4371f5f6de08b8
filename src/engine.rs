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

//! Assignment coordinator.
//!
//! The [`Engine`] owns the ride and driver stores, drives the ride
//! lifecycle, and publishes every committed transition into the
//! notification bus.
//!
//! # Race safety
//!
//! `accept_ride` is the one operation with a genuine race: any number of
//! drivers may try to take the same pending ride at once, and a driver may
//! be contended across rides. The guard is the ride's entity mutex held
//! across the whole check-and-set, with the driver's mutex acquired inside
//! it. Every operation that touches both entities locks ride first, then
//! driver, and never more than one of each, so the lock graph is acyclic.
//! Exactly one concurrent accept observes `Pending`/`Available` and
//! commits; the rest fail with a Conflict-class error and no mutation.
//!
//! Events are published while the ride's mutex is still held. Channel sends
//! are unbounded and never block, and this is what gives subscribers
//! commit-order delivery per ride.

use crate::base::{DriverId, RideId};
use crate::bus::{NotificationBus, Room};
use crate::driver::{Driver, DriverRegistration};
use crate::eligibility;
use crate::error::DispatchError;
use crate::events::DispatchEvent;
use crate::gateway::EventGateway;
use crate::ride::{Ride, RideRequest, RideStatus};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Tunable engine policy.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// When true, `NewRideRequest` goes to every driver-side connection
    /// (the dispatch broadcast group) and clients re-filter with the
    /// eligibility predicate. The default targets only eligible drivers'
    /// rooms, which keeps ineligible ride data off the wire.
    pub broadcast_new_rides: bool,
}

/// Ride/driver matching and assignment engine.
///
/// # Invariants
///
/// - At most one driver is ever assigned to a ride; an accepted ride's
///   driver is never reassigned.
/// - A ride's `driver`/`status` and the paired driver's
///   `current_ride`/`status` change together, atomically as seen by any
///   other operation.
/// - `rejected_by` only grows and never contains the assigned driver.
/// - Terminal rides never change again, except that completing or
///   cancelling frees the assigned driver.
pub struct Engine {
    /// Rides indexed by id. The per-entity mutex is the accept guard.
    rides: DashMap<RideId, Mutex<Ride>>,
    /// Drivers indexed by id.
    drivers: DashMap<DriverId, Mutex<Driver>>,
    bus: Arc<NotificationBus>,
    config: EngineConfig,
    next_ride_id: AtomicU32,
    next_driver_id: AtomicU32,
}

impl Engine {
    /// Creates an engine with its own notification bus and default config.
    pub fn new() -> Self {
        Self::with_bus(Arc::new(NotificationBus::new()))
    }

    /// Creates an engine publishing into an externally owned bus.
    pub fn with_bus(bus: Arc<NotificationBus>) -> Self {
        Self::with_config(bus, EngineConfig::default())
    }

    pub fn with_config(bus: Arc<NotificationBus>, config: EngineConfig) -> Self {
        Engine {
            rides: DashMap::new(),
            drivers: DashMap::new(),
            bus,
            config,
            next_ride_id: AtomicU32::new(1),
            next_driver_id: AtomicU32::new(1),
        }
    }

    /// The bus this engine publishes into.
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// A gateway over this engine's bus for client connections.
    pub fn gateway(&self) -> EventGateway {
        EventGateway::new(Arc::clone(&self.bus))
    }

    // === Rides ===

    /// Creates a pending ride and announces it to driver-side connections.
    ///
    /// Fan-out follows [`EngineConfig::broadcast_new_rides`]: targeted
    /// per-driver rooms by default, the dispatch broadcast group otherwise.
    ///
    /// # Errors
    ///
    /// Validation errors from [`RideRequest::validate`]; nothing is stored
    /// on failure.
    pub fn create_ride(&self, request: RideRequest) -> Result<Ride, DispatchError> {
        request.validate()?;

        let id = RideId(self.next_ride_id.fetch_add(1, Ordering::Relaxed));
        let ride = Ride::new(id, request);
        let snapshot = ride.clone();
        self.rides.insert(id, Mutex::new(ride));
        tracing::info!(ride = %id, "ride created");

        let event = Arc::new(DispatchEvent::NewRideRequest {
            ride: snapshot.clone(),
        });
        if self.config.broadcast_new_rides {
            self.bus.publish(Room::Dispatch, &event);
        } else {
            for driver_id in self.eligible_driver_ids(&snapshot) {
                self.bus.publish(Room::Driver(driver_id), &event);
            }
        }

        Ok(snapshot)
    }

    /// Snapshot of one ride.
    pub fn get_ride(&self, id: RideId) -> Option<Ride> {
        self.rides.get(&id).map(|entry| entry.lock().clone())
    }

    /// Snapshots of all rides, unordered.
    pub fn rides(&self) -> Vec<Ride> {
        self.rides
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect()
    }

    /// Snapshots of rides still waiting for a driver.
    pub fn pending_rides(&self) -> Vec<Ride> {
        self.rides
            .iter()
            .filter_map(|entry| {
                let ride = entry.value().lock();
                (ride.status == RideStatus::Pending).then(|| ride.clone())
            })
            .collect()
    }

    /// Drivers currently eligible for a ride, re-evaluated on demand.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RideNotFound`] for an unknown id.
    pub fn eligible_drivers(&self, ride_id: RideId) -> Result<Vec<Driver>, DispatchError> {
        let ride = self.get_ride(ride_id).ok_or(DispatchError::RideNotFound)?;
        Ok(self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value().lock();
                eligibility::is_eligible(&ride, &driver).then(|| driver.clone())
            })
            .collect())
    }

    fn eligible_driver_ids(&self, ride: &Ride) -> Vec<DriverId> {
        self.drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value().lock();
                eligibility::is_eligible(ride, &driver).then_some(driver.id)
            })
            .collect()
    }

    // === Drivers ===

    /// Registers a driver, available immediately.
    ///
    /// # Errors
    ///
    /// Validation errors from [`DriverRegistration::validate`].
    pub fn add_driver(&self, registration: DriverRegistration) -> Result<Driver, DispatchError> {
        registration.validate()?;

        let id = DriverId(self.next_driver_id.fetch_add(1, Ordering::Relaxed));
        let driver = Driver::new(id, registration);
        let snapshot = driver.clone();
        self.drivers.insert(id, Mutex::new(driver));
        tracing::info!(driver = %id, "driver registered");
        Ok(snapshot)
    }

    /// Snapshot of one driver.
    pub fn get_driver(&self, id: DriverId) -> Option<Driver> {
        self.drivers.get(&id).map(|entry| entry.lock().clone())
    }

    /// Snapshots of all drivers, unordered.
    pub fn drivers(&self) -> Vec<Driver> {
        self.drivers
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect()
    }

    /// Removes a driver, cascade-cancelling any ride it holds.
    ///
    /// The driver is taken offline under its own lock first so no
    /// concurrent accept can assign it mid-removal; a held ride is then
    /// cancelled through the normal path (passengers see
    /// `RideStatusUpdated`) before the record is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DriverNotFound`] for an unknown id.
    pub fn remove_driver(&self, driver_id: DriverId) -> Result<(), DispatchError> {
        loop {
            let held_ride = {
                let entry = self
                    .drivers
                    .get(&driver_id)
                    .ok_or(DispatchError::DriverNotFound)?;
                let mut driver = entry.lock();
                match driver.current_ride {
                    Some(ride_id) => ride_id,
                    None => {
                        // Not busy, so this cannot fail; offline drivers
                        // are invisible to the eligibility predicate.
                        driver.go_offline()?;
                        break;
                    }
                }
            };

            // Cancel outside the driver lock; cancel_ride takes the ride
            // lock first, then the driver lock, like every other path.
            if self.cancel_ride(held_ride).is_err() {
                // Lost a race against complete/cancel; the other operation
                // frees the driver, re-check its state.
                std::thread::yield_now();
            }
        }

        // No entity lock is held here; removing from the map cannot
        // interleave with a lock holder waiting on this shard.
        self.drivers.remove(&driver_id);
        tracing::info!(driver = %driver_id, "driver removed");
        Ok(())
    }

    // === Lifecycle transitions ===

    /// Race-safe accept: assigns `driver_id` to `ride_id` iff the ride is
    /// still pending and the driver is available and eligible, as one
    /// atomic unit. Exactly one of any set of concurrent accepts on the
    /// same ride (or the same driver) succeeds.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RideNotFound`] / [`DispatchError::DriverNotFound`]
    /// - [`DispatchError::RideNotPending`] / [`DispatchError::RideTerminal`] -
    ///   lost the race on the ride.
    /// - [`DispatchError::DriverNotAvailable`] - lost the race on the driver.
    /// - [`DispatchError::DriverNotEligible`] - preferences or a prior
    ///   rejection exclude the ride.
    pub fn accept_ride(
        &self,
        ride_id: RideId,
        driver_id: DriverId,
    ) -> Result<(Ride, Driver), DispatchError> {
        let ride_entry = self
            .rides
            .get(&ride_id)
            .ok_or(DispatchError::RideNotFound)?;
        let mut ride = ride_entry.lock();

        let driver_entry = self
            .drivers
            .get(&driver_id)
            .ok_or(DispatchError::DriverNotFound)?;
        let mut driver = driver_entry.lock();

        match ride.status {
            RideStatus::Pending => {}
            RideStatus::Accepted => return Err(DispatchError::RideNotPending),
            RideStatus::Completed | RideStatus::Cancelled => {
                return Err(DispatchError::RideTerminal);
            }
        }
        eligibility::check(&ride, &driver)?;

        // Both checks passed under both locks; neither assign can fail.
        ride.assign(driver_id)?;
        driver.assign(ride_id)?;
        tracing::info!(ride = %ride_id, driver = %driver_id, "ride accepted");

        let ride_snapshot = ride.clone();
        let driver_snapshot = driver.clone();
        self.publish_status_update(&ride_snapshot, Some(driver_snapshot.clone()));

        Ok((ride_snapshot, driver_snapshot))
    }

    /// Records a driver's rejection of a pending ride. Idempotent per
    /// driver; the eligible set for this ride only narrows.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RideNotFound`] / [`DispatchError::DriverNotFound`]
    /// - [`DispatchError::RideNotPending`] / [`DispatchError::RideTerminal`]
    /// - [`DispatchError::DriverAssigned`] - the assigned driver cannot
    ///   reject its own ride.
    pub fn reject_ride(
        &self,
        ride_id: RideId,
        driver_id: DriverId,
    ) -> Result<Ride, DispatchError> {
        if !self.drivers.contains_key(&driver_id) {
            return Err(DispatchError::DriverNotFound);
        }

        let ride_entry = self
            .rides
            .get(&ride_id)
            .ok_or(DispatchError::RideNotFound)?;
        let mut ride = ride_entry.lock();

        ride.add_rejection(driver_id)?;
        tracing::debug!(ride = %ride_id, driver = %driver_id, "ride rejected");

        let snapshot = ride.clone();
        let event = Arc::new(DispatchEvent::RideStatusUpdated {
            ride: snapshot.clone(),
            driver: None,
        });
        self.bus.publish(Room::Ride(ride_id), &event);
        self.bus.publish(Room::Driver(driver_id), &event);

        Ok(snapshot)
    }

    /// Completes an accepted ride and frees its driver.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RideNotFound`]
    /// - [`DispatchError::RideNotAccepted`] - ride is still pending.
    /// - [`DispatchError::RideTerminal`] - ride already finished.
    pub fn complete_ride(
        &self,
        ride_id: RideId,
    ) -> Result<(Ride, Option<Driver>), DispatchError> {
        let ride_entry = self
            .rides
            .get(&ride_id)
            .ok_or(DispatchError::RideNotFound)?;
        let mut ride = ride_entry.lock();

        ride.complete()?;
        // Completed rides keep the driver reference for display; the
        // driver record itself goes back to available.
        let driver_snapshot = ride.driver.and_then(|id| self.release_driver(id));
        tracing::info!(ride = %ride_id, "ride completed");

        let snapshot = ride.clone();
        self.publish_status_update(&snapshot, driver_snapshot.clone());
        Ok((snapshot, driver_snapshot))
    }

    /// Cancels a pending or accepted ride, freeing the driver if one was
    /// assigned.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RideNotFound`]
    /// - [`DispatchError::RideTerminal`] - ride already finished.
    pub fn cancel_ride(
        &self,
        ride_id: RideId,
    ) -> Result<(Ride, Option<Driver>), DispatchError> {
        let ride_entry = self
            .rides
            .get(&ride_id)
            .ok_or(DispatchError::RideNotFound)?;
        let mut ride = ride_entry.lock();

        let assigned = ride.cancel()?;
        let driver_snapshot = assigned.and_then(|id| self.release_driver(id));
        tracing::info!(ride = %ride_id, "ride cancelled");

        let snapshot = ride.clone();
        self.publish_status_update(&snapshot, driver_snapshot.clone());
        Ok((snapshot, driver_snapshot))
    }

    /// Frees a driver after its ride ended. Called with the ride lock held;
    /// takes the driver lock second, per the fixed lock order.
    fn release_driver(&self, driver_id: DriverId) -> Option<Driver> {
        let entry = self.drivers.get(&driver_id)?;
        let mut driver = entry.lock();
        driver.release();
        Some(driver.clone())
    }

    /// Publishes `RideStatusUpdated` into the ride's room and, when a
    /// driver is affected, that driver's room. Callers hold the ride lock,
    /// so per-ride delivery order matches commit order.
    fn publish_status_update(&self, ride: &Ride, driver: Option<Driver>) {
        let driver_room = driver.as_ref().map(|d| Room::Driver(d.id));
        let event = Arc::new(DispatchEvent::RideStatusUpdated {
            ride: ride.clone(),
            driver,
        });
        self.bus.publish(Room::Ride(ride.id), &event);
        if let Some(room) = driver_room {
            self.bus.publish(room, &event);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
