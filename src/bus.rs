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

//! Room-based notification bus.
//!
//! A room is a named multicast group of live connections: an event published
//! into a room reaches every current member and nobody else. Membership is
//! independent of entity existence, so a connection may join the room for a
//! ride that has not been created yet and will start receiving events once
//! it exists.
//!
//! Delivery uses one unbounded channel per connection. Sends never block,
//! so the engine may publish while still holding an entity guard; that is
//! what makes per-ride event order equal commit order.

use crate::base::{ConnectionId, DriverId, RideId};
use crate::events::DispatchEvent;
use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A multicast group keyed by the entity its members care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// Events for one driver (`driver_<id>` in the wire protocol).
    Driver(DriverId),
    /// Events for one ride (`ride_<id>` in the wire protocol).
    Ride(RideId),
    /// Every driver-side connection; used for broadcast-to-all fan-out.
    Dispatch,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(id) => write!(f, "driver_{id}"),
            Self::Ride(id) => write!(f, "ride_{id}"),
            Self::Dispatch => write!(f, "dispatch"),
        }
    }
}

/// Room registry and fan-out.
///
/// Owns the connection-to-room mapping outright; nothing else in the crate
/// keeps membership state. All maps are sharded ([`DashMap`]), so joins,
/// disconnects, and publishes on unrelated rooms proceed concurrently.
pub struct NotificationBus {
    /// Live connections and their delivery channels.
    subscribers: DashMap<ConnectionId, Sender<Arc<DispatchEvent>>>,
    /// Room membership, forward direction.
    rooms: DashMap<Room, HashSet<ConnectionId>>,
    /// Rooms per connection, for O(rooms-of-conn) disconnect cleanup.
    memberships: DashMap<ConnectionId, HashSet<Room>>,
    next_connection_id: AtomicU64,
}

impl NotificationBus {
    /// Creates a bus with no connections or rooms.
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection and returns its id and event receiver.
    ///
    /// The connection belongs to no rooms until it joins some.
    pub fn subscribe(&self) -> (ConnectionId, Receiver<Arc<DispatchEvent>>) {
        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = channel::unbounded();
        self.subscribers.insert(id, sender);
        tracing::debug!(connection = %id, "connection subscribed");
        (id, receiver)
    }

    /// Adds a connection to a room. Joining twice is a no-op.
    ///
    /// Returns false if the connection is not subscribed (already
    /// disconnected), in which case no membership is recorded.
    pub fn join(&self, connection: ConnectionId, room: Room) -> bool {
        if !self.subscribers.contains_key(&connection) {
            return false;
        }
        self.rooms.entry(room).or_default().insert(connection);
        self.memberships.entry(connection).or_default().insert(room);
        tracing::debug!(connection = %connection, room = %room, "joined room");
        true
    }

    /// Removes a connection from every room and drops its channel.
    ///
    /// Idempotent; does not touch any ride or driver state.
    pub fn disconnect(&self, connection: ConnectionId) {
        self.subscribers.remove(&connection);
        if let Some((_, rooms)) = self.memberships.remove(&connection) {
            for room in rooms {
                if let Some(mut members) = self.rooms.get_mut(&room) {
                    members.remove(&connection);
                }
            }
        }
        tracing::debug!(connection = %connection, "connection removed");
    }

    /// Delivers an event to every current member of a room.
    ///
    /// Returns the number of connections reached. Members whose receiver is
    /// gone are pruned as a side effect, mirroring removal on connection
    /// termination.
    pub fn publish(&self, room: Room, event: &Arc<DispatchEvent>) -> usize {
        // Snapshot the member set so no shard lock is held while sending.
        let members: Vec<ConnectionId> = match self.rooms.get(&room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for connection in members {
            match self.subscribers.get(&connection) {
                Some(sender) if sender.send(Arc::clone(event)).is_ok() => delivered += 1,
                _ => dead.push(connection),
            }
        }
        for connection in dead {
            self.disconnect(connection);
        }

        tracing::trace!(room = %room, delivered, "published event");
        delivered
    }

    /// Number of current members of a room.
    pub fn member_count(&self, room: Room) -> usize {
        self.rooms.get(&room).map_or(0, |members| members.len())
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
