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

//! Events fanned out to connected clients.
//!
//! Each event carries the post-transition snapshot of the entities it
//! concerns; subscribers never have to re-fetch to learn the new state.

use crate::driver::Driver;
use crate::ride::Ride;
use serde::{Deserialize, Serialize};

/// A state change published into rooms by the engine.
///
/// Serialized with a `type` tag matching the wire names the client
/// dashboards listen for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DispatchEvent {
    /// A passenger created a ride; sent to driver-side connections.
    #[serde(rename = "newRideRequest")]
    NewRideRequest { ride: Ride },

    /// A ride transitioned (accept, reject, complete, cancel); sent to the
    /// ride's room and, when a driver is affected, that driver's room.
    #[serde(rename = "rideStatusUpdated")]
    RideStatusUpdated {
        ride: Ride,
        #[serde(skip_serializing_if = "Option::is_none")]
        driver: Option<Driver>,
    },
}

impl DispatchEvent {
    /// The ride snapshot this event carries.
    pub fn ride(&self) -> &Ride {
        match self {
            Self::NewRideRequest { ride } => ride,
            Self::RideStatusUpdated { ride, .. } => ride,
        }
    }
}
