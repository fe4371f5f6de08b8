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

//! Driver entity and acceptance preferences.

use crate::DispatchError;
use crate::base::{DriverId, RideId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Availability state of a driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    #[default]
    Available,
    Busy,
    Offline,
}

/// A driver's standing acceptance preferences.
///
/// Defaults match the original operator-facing form: trips up to 10 km,
/// fares of at least 100, high traffic tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Preferences {
    /// Longest trip the driver will take, in km.
    pub max_trip_distance: Decimal,
    /// Smallest fare the driver will accept.
    pub minimum_fare: Decimal,
    /// When true, the driver declines rides through high traffic.
    pub avoid_traffic: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_trip_distance: Decimal::from(10),
            minimum_fare: Decimal::from(100),
            avoid_traffic: false,
        }
    }
}

impl Preferences {
    /// Rejects negative thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidPreference`] if either threshold is
    /// negative.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.max_trip_distance < Decimal::ZERO || self.minimum_fare < Decimal::ZERO {
            return Err(DispatchError::InvalidPreference);
        }
        Ok(())
    }
}

/// Validated input for registering a driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverRegistration {
    pub name: String,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub current_location: Option<String>,
}

impl DriverRegistration {
    /// Checks registration preconditions: non-empty name, valid thresholds.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MissingDriverName`]
    /// - [`DispatchError::InvalidPreference`]
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::MissingDriverName);
        }
        self.preferences.validate()
    }
}

/// A registered driver.
///
/// # Invariants
///
/// - `current_ride` is `Some(r)` iff the ride `r` is accepted with this
///   driver assigned, and then `status` is `Busy`.
/// - A driver holds at most one ride at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub preferences: Preferences,
    pub status: DriverStatus,
    pub current_location: Option<String>,
    pub current_ride: Option<RideId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// Builds an available driver from an already-validated registration.
    pub fn new(id: DriverId, registration: DriverRegistration) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: registration.name,
            preferences: registration.preferences,
            status: DriverStatus::Available,
            current_location: registration.current_location,
            current_ride: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.current_ride.is_some(),
            self.status == DriverStatus::Busy,
            "Invariant violated: current_ride does not match status {:?}",
            self.status
        );
    }

    /// Puts the driver on a ride, moving `Available` to `Busy`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DriverNotAvailable`] if the driver is busy
    /// or offline.
    pub fn assign(&mut self, ride: RideId) -> Result<(), DispatchError> {
        if self.status != DriverStatus::Available {
            return Err(DispatchError::DriverNotAvailable);
        }
        self.status = DriverStatus::Busy;
        self.current_ride = Some(ride);
        self.updated_at = Utc::now();
        self.assert_invariants();
        Ok(())
    }

    /// Frees the driver after its ride completes or is cancelled.
    ///
    /// Idempotent: releasing an already-free driver is a no-op, so cleanup
    /// paths do not have to care whether the ride still held the driver.
    pub fn release(&mut self) {
        if self.current_ride.take().is_some() {
            self.status = DriverStatus::Available;
            self.updated_at = Utc::now();
        }
        self.assert_invariants();
    }

    /// Takes the driver off duty. Only valid while not on a ride; the
    /// caller cancels any held ride first.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DriverNotAvailable`] if the driver is busy.
    pub fn go_offline(&mut self) -> Result<(), DispatchError> {
        if self.status == DriverStatus::Busy {
            return Err(DispatchError::DriverNotAvailable);
        }
        self.status = DriverStatus::Offline;
        self.updated_at = Utc::now();
        self.assert_invariants();
        Ok(())
    }
}
