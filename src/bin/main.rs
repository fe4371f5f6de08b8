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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use ridematch_demo_rs::{
    Driver, DriverId, DriverRegistration, Engine, Preferences, Ride, RideId, RideRequest,
    TrafficLevel,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;

/// Dispatch Engine - Replay operation CSV files
///
/// Reads dispatch operations from a CSV file and outputs final ride states
/// to stdout. Supports driver registration, ride creation, accepts,
/// rejects, completions, and cancellations.
#[derive(Parser, Debug)]
#[command(name = "ridematch-demo-rs")]
#[command(about = "A dispatch engine that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,ride,driver,pickup,dropoff,distance,fare,traffic,name,max_distance,min_fare,avoid_traffic
    /// Example: cargo run -- operations.csv > rides.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output final driver states instead of ride states
    #[arg(long)]
    drivers: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match process_operations(BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    let result = if args.drivers {
        write_drivers(&engine, std::io::stdout())
    } else {
        write_rides(&engine, std::io::stdout())
    };
    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Only `op` is required; the remaining columns apply to a subset of the
/// operations and may be left empty.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    ride: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    driver: Option<u32>,
    #[serde(default)]
    pickup: Option<String>,
    #[serde(default)]
    dropoff: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    distance: Option<Decimal>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    fare: Option<Decimal>,
    #[serde(default)]
    traffic: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    max_distance: Option<Decimal>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    min_fare: Option<Decimal>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    avoid_traffic: Option<bool>,
}

/// One replayable dispatch operation.
#[derive(Debug)]
enum Operation {
    AddDriver(DriverRegistration),
    RemoveDriver(DriverId),
    CreateRide(RideRequest),
    Accept(RideId, DriverId),
    Reject(RideId, DriverId),
    Complete(RideId),
    Cancel(RideId),
}

impl CsvRecord {
    /// Converts a CSV record to an operation.
    ///
    /// Returns `None` for unknown operations or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        match self.op.to_lowercase().as_str() {
            "add_driver" => {
                let defaults = Preferences::default();
                Some(Operation::AddDriver(DriverRegistration {
                    name: self.name?,
                    preferences: Preferences {
                        max_trip_distance: self.max_distance.unwrap_or(defaults.max_trip_distance),
                        minimum_fare: self.min_fare.unwrap_or(defaults.minimum_fare),
                        avoid_traffic: self.avoid_traffic.unwrap_or(defaults.avoid_traffic),
                    },
                    current_location: None,
                }))
            }
            "remove_driver" => Some(Operation::RemoveDriver(DriverId(self.driver?))),
            "create_ride" => {
                let traffic = match self.traffic.as_deref() {
                    None | Some("") | Some("low") => TrafficLevel::Low,
                    Some("medium") => TrafficLevel::Medium,
                    Some("high") => TrafficLevel::High,
                    Some(_) => return None,
                };
                Some(Operation::CreateRide(RideRequest {
                    pickup: self.pickup?,
                    dropoff: self.dropoff?,
                    distance: self.distance?,
                    fare: self.fare?,
                    traffic_level: traffic,
                }))
            }
            "accept" => Some(Operation::Accept(
                RideId(self.ride?),
                DriverId(self.driver?),
            )),
            "reject" => Some(Operation::Reject(
                RideId(self.ride?),
                DriverId(self.driver?),
            )),
            "complete" => Some(Operation::Complete(RideId(self.ride?))),
            "cancel" => Some(Operation::Cancel(RideId(self.ride?))),
            _ => None,
        }
    }
}

/// Replays operations from a CSV reader through a fresh engine.
///
/// Uses streaming parsing, so arbitrarily long operation logs never load
/// into memory at once. Malformed rows and failed operations are skipped;
/// a replay is a best-effort reconstruction, not a transaction.
///
/// # CSV Format
///
/// Expected columns:
/// `op, ride, driver, pickup, dropoff, distance, fare, traffic, name, max_distance, min_fare, avoid_traffic`
///
/// # Example
///
/// ```csv
/// op,ride,driver,pickup,dropoff,distance,fare,traffic,name,max_distance,min_fare,avoid_traffic
/// add_driver,,,,,,,,D1,10,100,false
/// create_ride,,,Central Station,Airport,5,150,low,,,,
/// accept,1,1,,,,,,,,,
/// complete,1,,,,,,,,,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is
/// invalid. Individual operation errors are logged and skipped.
pub fn process_operations<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let engine = Engine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // Allow trailing columns to be omitted
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(op) = record.into_operation() else {
                    tracing::warn!("skipping invalid operation record");
                    continue;
                };

                let outcome = match op {
                    Operation::AddDriver(reg) => engine.add_driver(reg).map(|_| ()),
                    Operation::RemoveDriver(id) => engine.remove_driver(id),
                    Operation::CreateRide(req) => engine.create_ride(req).map(|_| ()),
                    Operation::Accept(ride, driver) => {
                        engine.accept_ride(ride, driver).map(|_| ())
                    }
                    Operation::Reject(ride, driver) => {
                        engine.reject_ride(ride, driver).map(|_| ())
                    }
                    Operation::Complete(ride) => engine.complete_ride(ride).map(|_| ()),
                    Operation::Cancel(ride) => engine.cancel_ride(ride).map(|_| ()),
                };
                if let Err(e) = outcome {
                    tracing::warn!("skipping failed operation: {e}");
                }
            }
            Err(e) => {
                tracing::warn!("skipping malformed row: {e}");
                continue;
            }
        }
    }

    Ok(engine)
}

/// Flat ride row for CSV output.
#[derive(Debug, Serialize)]
struct RideRow {
    id: u32,
    pickup: String,
    dropoff: String,
    distance: Decimal,
    fare: Decimal,
    traffic: TrafficLevel,
    status: ridematch_demo_rs::RideStatus,
    driver: Option<u32>,
    rejected_by: String,
}

impl From<Ride> for RideRow {
    fn from(ride: Ride) -> Self {
        let mut rejected: Vec<u32> = ride.rejected_by.iter().map(|d| d.0).collect();
        rejected.sort_unstable();
        Self {
            id: ride.id.0,
            pickup: ride.pickup,
            dropoff: ride.dropoff,
            distance: ride.distance,
            fare: ride.fare,
            traffic: ride.traffic_level,
            status: ride.status,
            driver: ride.driver.map(|d| d.0),
            rejected_by: rejected
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Flat driver row for CSV output.
#[derive(Debug, Serialize)]
struct DriverRow {
    id: u32,
    name: String,
    status: ridematch_demo_rs::DriverStatus,
    max_distance: Decimal,
    min_fare: Decimal,
    avoid_traffic: bool,
    current_ride: Option<u32>,
}

impl From<Driver> for DriverRow {
    fn from(driver: Driver) -> Self {
        Self {
            id: driver.id.0,
            name: driver.name,
            status: driver.status,
            max_distance: driver.preferences.max_trip_distance,
            min_fare: driver.preferences.minimum_fare,
            avoid_traffic: driver.preferences.avoid_traffic,
            current_ride: driver.current_ride.map(|r| r.0),
        }
    }
}

/// Writes final ride states as CSV, ordered by id.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_rides<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut rides = engine.rides();
    rides.sort_by_key(|ride| ride.id.0);
    for ride in rides {
        wtr.serialize(RideRow::from(ride))?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes final driver states as CSV, ordered by id.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_drivers<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut drivers = engine.drivers();
    drivers.sort_by_key(|driver| driver.id.0);
    for driver in drivers {
        wtr.serialize(DriverRow::from(driver))?;
    }

    wtr.flush()?;
    Ok(())
}
