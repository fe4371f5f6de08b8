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

//! Ride entity and lifecycle state machine.
//!
//! Rides follow a small state machine:
//! - [`Pending`] → [`Accepted`] (via accept)
//! - [`Pending`] → [`Cancelled`] (via cancel)
//! - [`Accepted`] → [`Completed`] (via complete) or [`Cancelled`] (via cancel)
//!
//! `Completed` and `Cancelled` are terminal: no transition leaves them.
//!
//! [`Pending`]: RideStatus::Pending
//! [`Accepted`]: RideStatus::Accepted
//! [`Completed`]: RideStatus::Completed
//! [`Cancelled`]: RideStatus::Cancelled

use crate::DispatchError;
use crate::base::{DriverId, RideId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Traffic conditions along a ride's route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// Lifecycle state of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
}

impl RideStatus {
    /// Returns true for states with no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Validated input for creating a ride.
///
/// Locations are opaque strings (free text or `"lat, lng"` pairs from an
/// external geocoder). Unknown fields in incoming payloads are rejected
/// rather than silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RideRequest {
    pub pickup: String,
    pub dropoff: String,
    /// Trip distance in km.
    pub distance: Decimal,
    pub fare: Decimal,
    #[serde(default)]
    pub traffic_level: TrafficLevel,
}

impl RideRequest {
    /// Checks the create preconditions: non-empty locations,
    /// `distance > 0`, `fare >= 0`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MissingPickup`] / [`DispatchError::MissingDropoff`]
    /// - [`DispatchError::InvalidDistance`] - distance is zero or negative.
    /// - [`DispatchError::InvalidFare`] - fare is negative.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.pickup.trim().is_empty() {
            return Err(DispatchError::MissingPickup);
        }
        if self.dropoff.trim().is_empty() {
            return Err(DispatchError::MissingDropoff);
        }
        if self.distance <= Decimal::ZERO {
            return Err(DispatchError::InvalidDistance);
        }
        if self.fare < Decimal::ZERO {
            return Err(DispatchError::InvalidFare);
        }
        Ok(())
    }
}

/// A ride request and its assignment state.
///
/// # Invariants
///
/// - `driver` is `Some` iff `status` is `Accepted` or `Completed`.
/// - `rejected_by` only grows and never contains the assigned driver.
/// - No field changes after a terminal state is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub pickup: String,
    pub dropoff: String,
    /// Trip distance in km.
    pub distance: Decimal,
    pub fare: Decimal,
    pub traffic_level: TrafficLevel,
    pub status: RideStatus,
    pub driver: Option<DriverId>,
    /// Drivers that declined this ride; monotonically grows.
    pub rejected_by: HashSet<DriverId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    /// Builds a pending ride from an already-validated request.
    pub fn new(id: RideId, request: RideRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            pickup: request.pickup,
            dropoff: request.dropoff,
            distance: request.distance,
            fare: request.fare,
            traffic_level: request.traffic_level,
            status: RideStatus::Pending,
            driver: None,
            rejected_by: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.driver.is_some(),
            matches!(self.status, RideStatus::Accepted | RideStatus::Completed),
            "Invariant violated: driver set does not match status {:?}",
            self.status
        );
        if let Some(driver) = self.driver {
            debug_assert!(
                !self.rejected_by.contains(&driver),
                "Invariant violated: assigned driver {driver} is in rejected_by"
            );
        }
    }

    /// Assigns a driver, moving the ride from `Pending` to `Accepted`.
    ///
    /// Eligibility is checked by the caller under the same guard; this
    /// method only enforces the state machine.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RideTerminal`] - ride is completed or cancelled.
    /// - [`DispatchError::RideNotPending`] - ride was already accepted.
    pub fn assign(&mut self, driver: DriverId) -> Result<(), DispatchError> {
        match self.status {
            RideStatus::Pending => {}
            RideStatus::Accepted => return Err(DispatchError::RideNotPending),
            RideStatus::Completed | RideStatus::Cancelled => {
                return Err(DispatchError::RideTerminal);
            }
        }
        self.status = RideStatus::Accepted;
        self.driver = Some(driver);
        self.updated_at = Utc::now();
        self.assert_invariants();
        Ok(())
    }

    /// Records a driver's rejection. Repeat rejections by the same driver
    /// are a no-op, not an error; the set only grows.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::DriverAssigned`] - the assigned driver cannot
    ///   reject its own accepted ride.
    /// - [`DispatchError::RideNotPending`] - ride was accepted by another
    ///   driver.
    /// - [`DispatchError::RideTerminal`] - ride is completed or cancelled.
    pub fn add_rejection(&mut self, driver: DriverId) -> Result<(), DispatchError> {
        match self.status {
            RideStatus::Pending => {}
            RideStatus::Accepted => {
                if self.driver == Some(driver) {
                    return Err(DispatchError::DriverAssigned);
                }
                return Err(DispatchError::RideNotPending);
            }
            RideStatus::Completed | RideStatus::Cancelled => {
                return Err(DispatchError::RideTerminal);
            }
        }
        if self.rejected_by.insert(driver) {
            self.updated_at = Utc::now();
        }
        self.assert_invariants();
        Ok(())
    }

    /// Moves the ride from `Accepted` to `Completed`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RideNotAccepted`] - ride is still pending.
    /// - [`DispatchError::RideTerminal`] - ride already finished.
    pub fn complete(&mut self) -> Result<(), DispatchError> {
        match self.status {
            RideStatus::Accepted => {}
            RideStatus::Pending => return Err(DispatchError::RideNotAccepted),
            RideStatus::Completed | RideStatus::Cancelled => {
                return Err(DispatchError::RideTerminal);
            }
        }
        self.status = RideStatus::Completed;
        self.updated_at = Utc::now();
        self.assert_invariants();
        Ok(())
    }

    /// Moves the ride to `Cancelled` from either live state.
    ///
    /// Returns the driver that was assigned, if any, so the caller can
    /// release it under the same guard.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RideTerminal`] - ride already finished.
    pub fn cancel(&mut self) -> Result<Option<DriverId>, DispatchError> {
        if self.status.is_terminal() {
            return Err(DispatchError::RideTerminal);
        }
        let assigned = self.driver.take();
        self.status = RideStatus::Cancelled;
        self.updated_at = Utc::now();
        self.assert_invariants();
        Ok(assigned)
    }
}
