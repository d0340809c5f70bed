//! Route formation and arrival-time planning.
//!
//! All routing intelligence lives behind [`DirectionsService`]: the planner
//! sends one request per route segment and trusts the returned legs and
//! waypoint order. Failures surface to the caller untouched, no retries.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trip::{DeliveryStop, DeliveryTrip};

/// Strip HTML breaks from a stored address and keep its first three blocks.
pub fn sanitize_address(address: &str) -> String {
    address
        .split("<br>")
        .take(3)
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Form the address route list for a trip: origin is the driver's home
/// address and the final destination is home again. When optimizing, a
/// locked stop ends its leg and starts the next one, so the optimizer can
/// never move it; the homebound destination is only appended when the last
/// stop is not locked.
///
/// Stops `[A, B(locked), C, D]` become `[[home, A, B], [B, C, D, home]]`.
pub fn form_route_list(
    home_address: &str,
    stops: &[DeliveryStop],
    optimize: bool,
) -> Vec<Vec<String>> {
    let home = sanitize_address(home_address);

    let mut route_list = Vec::new();
    let mut leg = vec![home.clone()];

    for stop in stops {
        let address = sanitize_address(&stop.address);
        leg.push(address.clone());

        if optimize && stop.lock {
            route_list.push(leg);
            leg = vec![address];
        }
    }

    if leg.len() > 1 {
        leg.push(home);
        route_list.push(leg);
    }

    route_list
}

/// One directions request: origin, destination and the waypoints between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionsRequest {
    pub origin: String,
    pub destination: String,
    pub waypoints: Vec<String>,
    pub optimize_waypoints: bool,
}

/// One leg of a returned route. Distances are metres, durations seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_m: u64,
    pub duration_s: u64,
    pub end_lat: f64,
    pub end_lng: f64,
}

/// A directions response: legs in driving order plus, when optimization was
/// requested, the optimized order of the request's waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDirections {
    pub legs: Vec<RouteLeg>,
    pub waypoint_order: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum DirectionsError {
    #[error("directions API key is not configured")]
    MissingApiKey,
    #[error("directions request failed: {0}")]
    Request(String),
}

/// An external mapping backend that resolves a route into driving legs.
#[async_trait]
pub trait DirectionsService: Send + Sync {
    async fn directions(&self, request: DirectionsRequest)
        -> Result<RouteDirections, DirectionsError>;
}

/// Arrival estimate for one stop, in planned driving order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEstimate {
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub distance_m: u64,
    pub lat: f64,
    pub lng: f64,
}

/// A computed route: the stop permutation (new position -> original index),
/// per-stop estimates in the new order, and the trip's total distance
/// including the homebound leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub stop_order: Vec<usize>,
    pub stops: Vec<StopEstimate>,
    pub total_distance_m: u64,
}

#[derive(Debug, Error)]
pub enum RoutePlanError {
    #[error("cannot calculate arrival times, the driver address is missing")]
    MissingDriverAddress,
    #[error(transparent)]
    Directions(#[from] DirectionsError),
    #[error("directions response does not match the requested route")]
    RouteMismatch,
}

/// Plan a trip's route: fetch directions per segment, fold the returned
/// waypoint orders into one stop permutation, and chain per-stop arrival
/// estimates from the departure time, inserting `stop_delay_minutes` of
/// unloading time between stops. The final homebound leg counts toward the
/// total distance but never toward the last stop's arrival.
pub async fn plan_route(
    trip: &DeliveryTrip,
    service: &dyn DirectionsService,
    optimize: bool,
    stop_delay_minutes: i64,
) -> Result<RoutePlan, RoutePlanError> {
    let home = trip
        .driver_address()
        .ok_or(RoutePlanError::MissingDriverAddress)?;

    let stops = trip.stops();
    let route_list = form_route_list(home, stops, optimize);

    let last_stop_locked = stops.last().map(|s| s.lock).unwrap_or(false);
    let homebound = !optimize || !last_stop_locked;

    let mut stop_order: Vec<usize> = (0..stops.len()).collect();
    let mut estimates: Vec<StopEstimate> = Vec::with_capacity(stops.len());
    let mut departure = trip.departure_time();
    let mut total_distance_m: u64 = 0;

    let last_segment = route_list.len().saturating_sub(1);

    for (segment, route) in route_list.iter().enumerate() {
        let request = DirectionsRequest {
            origin: route[0].clone(),
            destination: route[route.len() - 1].clone(),
            waypoints: route[1..route.len() - 1].to_vec(),
            optimize_waypoints: optimize,
        };

        let directions = service.directions(request).await?;

        if directions.legs.len() != route.len() - 1 {
            return Err(RoutePlanError::RouteMismatch);
        }

        if optimize && directions.waypoint_order.len() > 1 {
            apply_waypoint_order(&mut stop_order, &directions.waypoint_order, estimates.len())?;
        }

        total_distance_m += directions.legs.iter().map(|leg| leg.distance_m).sum::<u64>();

        // The legs come back in optimized driving order; each one ends at
        // the next stop, except the homebound leg of the final segment.
        let stop_legs = if segment == last_segment && homebound {
            &directions.legs[..directions.legs.len() - 1]
        } else {
            &directions.legs[..]
        };

        for leg in stop_legs {
            let estimated_arrival = departure + Duration::seconds(leg.duration_s as i64);
            estimates.push(StopEstimate {
                estimated_arrival: Some(estimated_arrival),
                distance_m: leg.distance_m,
                lat: leg.end_lat,
                lng: leg.end_lng,
            });
            departure = estimated_arrival + Duration::minutes(stop_delay_minutes);
        }
    }

    if estimates.len() != stops.len() {
        return Err(RoutePlanError::RouteMismatch);
    }

    Ok(RoutePlan {
        stop_order,
        stops: estimates,
        total_distance_m,
    })
}

/// Fold one segment's optimized waypoint order into the running stop
/// permutation. `start` is the position of the segment's first waypoint.
fn apply_waypoint_order(
    stop_order: &mut [usize],
    waypoint_order: &[usize],
    start: usize,
) -> Result<(), RoutePlanError> {
    let end = start
        .checked_add(waypoint_order.len())
        .filter(|&end| end <= stop_order.len())
        .ok_or(RoutePlanError::RouteMismatch)?;

    let window = stop_order[start..end].to_vec();
    let mut seen = vec![false; window.len()];

    for (new_pos, &old_pos) in waypoint_order.iter().enumerate() {
        match seen.get_mut(old_pos) {
            Some(slot) if !*slot => *slot = true,
            _ => return Err(RoutePlanError::RouteMismatch),
        }
        stop_order[start + new_pos] = window[old_pos];
    }

    Ok(())
}
