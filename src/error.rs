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

//! Error types for dispatch operations.

use thiserror::Error;

/// Broad classification of a [`DispatchError`].
///
/// Every error is per-request and leaves all entities consistent:
/// - [`Validation`](ErrorKind::Validation): malformed input, rejected before
///   any mutation; resubmit corrected input.
/// - [`NotFound`](ErrorKind::NotFound): unknown ride or driver id.
/// - [`Conflict`](ErrorKind::Conflict): the operation lost a race or the
///   entity is in the wrong state; no mutation occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
}

/// Dispatch operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Pickup location is missing or empty
    #[error("missing pickup location")]
    MissingPickup,

    /// Dropoff location is missing or empty
    #[error("missing dropoff location")]
    MissingDropoff,

    /// Distance is zero or negative
    #[error("invalid distance (must be positive)")]
    InvalidDistance,

    /// Fare is negative
    #[error("invalid fare (must be non-negative)")]
    InvalidFare,

    /// Driver name is missing or empty
    #[error("missing driver name")]
    MissingDriverName,

    /// A preference threshold is negative
    #[error("invalid preference (thresholds must be non-negative)")]
    InvalidPreference,

    /// Referenced ride ID does not exist
    #[error("ride not found")]
    RideNotFound,

    /// Referenced driver ID does not exist
    #[error("driver not found")]
    DriverNotFound,

    /// Ride has already left the pending state
    #[error("ride is no longer pending")]
    RideNotPending,

    /// Ride is not in the accepted state
    #[error("ride is not accepted")]
    RideNotAccepted,

    /// Ride is already completed or cancelled
    #[error("ride already reached a terminal state")]
    RideTerminal,

    /// Driver is busy or offline
    #[error("driver is not available")]
    DriverNotAvailable,

    /// Driver preferences or rejection history exclude this ride
    #[error("driver is not eligible for this ride")]
    DriverNotEligible,

    /// The assigned driver attempted to reject its own ride
    #[error("assigned driver cannot reject the ride")]
    DriverAssigned,
}

impl DispatchError {
    /// Classifies this error per the dispatch taxonomy.
    ///
    /// The split drives the HTTP status mapping in the demo server
    /// (400 / 404 / 409) but is transport-agnostic.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPickup
            | Self::MissingDropoff
            | Self::InvalidDistance
            | Self::InvalidFare
            | Self::MissingDriverName
            | Self::InvalidPreference => ErrorKind::Validation,
            Self::RideNotFound | Self::DriverNotFound => ErrorKind::NotFound,
            Self::RideNotPending
            | Self::RideNotAccepted
            | Self::RideTerminal
            | Self::DriverNotAvailable
            | Self::DriverNotEligible
            | Self::DriverAssigned => ErrorKind::Conflict,
        }
    }
}
