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

//! Driver eligibility predicate.
//!
//! A pure function of a ride and a driver, re-evaluated on demand and never
//! cached. Used client-side to filter the rides shown to a driver and
//! server-side as the guard inside `accept`, so both views agree by
//! construction.

use crate::DispatchError;
use crate::driver::{Driver, DriverStatus};
use crate::ride::{Ride, TrafficLevel};

/// Returns true iff `driver` may act on `ride` right now.
///
/// All five clauses must hold:
/// - the driver is available,
/// - the driver has not rejected the ride,
/// - the trip is within the driver's maximum distance,
/// - the fare meets the driver's minimum,
/// - the driver tolerates the ride's traffic level.
///
/// The clauses are independent; evaluation order is short-circuit cost only.
pub fn is_eligible(ride: &Ride, driver: &Driver) -> bool {
    check(ride, driver).is_ok()
}

/// Like [`is_eligible`], but reports which clause failed.
///
/// # Errors
///
/// - [`DispatchError::DriverNotAvailable`] - driver is busy or offline.
/// - [`DispatchError::DriverNotEligible`] - a preference clause or a prior
///   rejection excludes the ride.
pub fn check(ride: &Ride, driver: &Driver) -> Result<(), DispatchError> {
    if driver.status != DriverStatus::Available {
        return Err(DispatchError::DriverNotAvailable);
    }
    if ride.rejected_by.contains(&driver.id) {
        return Err(DispatchError::DriverNotEligible);
    }
    if ride.distance > driver.preferences.max_trip_distance {
        return Err(DispatchError::DriverNotEligible);
    }
    if ride.fare < driver.preferences.minimum_fare {
        return Err(DispatchError::DriverNotEligible);
    }
    if driver.preferences.avoid_traffic && ride.traffic_level == TrafficLevel::High {
        return Err(DispatchError::DriverNotEligible);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{DriverId, RideId};
    use crate::driver::{DriverRegistration, Preferences};
    use crate::ride::RideRequest;
    use rust_decimal_macros::dec;

    fn ride() -> Ride {
        Ride::new(
            RideId(1),
            RideRequest {
                pickup: "A".to_string(),
                dropoff: "B".to_string(),
                distance: dec!(5),
                fare: dec!(150),
                traffic_level: TrafficLevel::Low,
            },
        )
    }

    fn driver(preferences: Preferences) -> Driver {
        Driver::new(
            DriverId(1),
            DriverRegistration {
                name: "D1".to_string(),
                preferences,
                current_location: None,
            },
        )
    }

    #[test]
    fn eligible_with_default_preferences() {
        assert!(is_eligible(&ride(), &driver(Preferences::default())));
    }

    #[test]
    fn busy_driver_is_not_eligible() {
        let mut d = driver(Preferences::default());
        d.assign(RideId(9)).unwrap();
        assert_eq!(check(&ride(), &d), Err(DispatchError::DriverNotAvailable));
    }

    #[test]
    fn offline_driver_is_not_eligible() {
        let mut d = driver(Preferences::default());
        d.go_offline().unwrap();
        assert!(!is_eligible(&ride(), &d));
    }

    #[test]
    fn prior_rejection_excludes_only_that_driver() {
        let mut r = ride();
        r.add_rejection(DriverId(1)).unwrap();

        let d1 = driver(Preferences::default());
        assert!(!is_eligible(&r, &d1));

        let mut d2 = driver(Preferences::default());
        d2.id = DriverId(2);
        assert!(is_eligible(&r, &d2));
    }

    #[test]
    fn distance_over_limit_is_not_eligible() {
        let mut r = ride();
        r.distance = dec!(10.5);
        assert!(!is_eligible(&r, &driver(Preferences::default())));
    }

    #[test]
    fn distance_at_limit_is_eligible() {
        let mut r = ride();
        r.distance = dec!(10);
        assert!(is_eligible(&r, &driver(Preferences::default())));
    }

    #[test]
    fn fare_below_minimum_is_not_eligible() {
        let d = driver(Preferences {
            minimum_fare: dec!(200),
            ..Preferences::default()
        });
        assert_eq!(check(&ride(), &d), Err(DispatchError::DriverNotEligible));
    }

    #[test]
    fn fare_at_minimum_is_eligible() {
        let d = driver(Preferences {
            minimum_fare: dec!(150),
            ..Preferences::default()
        });
        assert!(is_eligible(&ride(), &d));
    }

    #[test]
    fn traffic_avoider_declines_high_traffic_only() {
        let avoider = driver(Preferences {
            avoid_traffic: true,
            ..Preferences::default()
        });

        let mut r = ride();
        r.traffic_level = TrafficLevel::High;
        assert!(!is_eligible(&r, &avoider));

        r.traffic_level = TrafficLevel::Medium;
        assert!(is_eligible(&r, &avoider));
    }

    #[test]
    fn high_traffic_is_fine_without_avoidance() {
        let mut r = ride();
        r.traffic_level = TrafficLevel::High;
        assert!(is_eligible(&r, &driver(Preferences::default())));
    }

    #[test]
    fn predicate_is_pure() {
        let r = ride();
        let d = driver(Preferences::default());
        let first = is_eligible(&r, &d);
        for _ in 0..10 {
            assert_eq!(is_eligible(&r, &d), first);
        }
    }
}
