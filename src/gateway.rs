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

//! Event gateway: per-connection room membership.
//!
//! The gateway is the client-facing edge of the notification layer. It
//! hands out [`Connection`] handles and implements the two join operations
//! clients may issue; there is no explicit leave, membership ends when the
//! connection terminates. Losing a connection never mutates a ride or
//! frees a driver.

use crate::base::{ConnectionId, DriverId, RideId};
use crate::bus::{NotificationBus, Room};
use crate::events::DispatchEvent;
use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::time::Duration;

/// A live client connection and its event stream.
///
/// Dropping the handle disconnects: the connection leaves every room and
/// its channel is removed from the bus.
pub struct Connection {
    id: ConnectionId,
    receiver: Receiver<Arc<DispatchEvent>>,
    bus: Arc<NotificationBus>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The raw event channel, for callers that integrate with their own
    /// select loop.
    pub fn receiver(&self) -> &Receiver<Arc<DispatchEvent>> {
        &self.receiver
    }

    /// Returns the next pending event without blocking.
    pub fn try_next(&self) -> Option<Arc<DispatchEvent>> {
        self.receiver.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Arc<DispatchEvent>> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.bus.disconnect(self.id);
    }
}

/// Client-facing membership operations over a shared [`NotificationBus`].
#[derive(Clone)]
pub struct EventGateway {
    bus: Arc<NotificationBus>,
}

impl EventGateway {
    pub fn new(bus: Arc<NotificationBus>) -> Self {
        Self { bus }
    }

    /// Registers a new live connection.
    pub fn connect(&self) -> Connection {
        let (id, receiver) = self.bus.subscribe();
        Connection {
            id,
            receiver,
            bus: Arc::clone(&self.bus),
        }
    }

    /// Subscribes a driver-side connection to its own room and to the
    /// dispatch broadcast group. The driver id does not have to exist yet.
    pub fn join_driver_room(&self, connection: &Connection, driver: DriverId) {
        self.bus.join(connection.id, Room::Driver(driver));
        self.bus.join(connection.id, Room::Dispatch);
    }

    /// Subscribes a passenger-side connection to one ride's room. A
    /// passenger client typically joins one room per ride it has listed.
    pub fn join_passenger_room(&self, connection: &Connection, ride: RideId) {
        self.bus.join(connection.id, Room::Ride(ride));
    }
}
