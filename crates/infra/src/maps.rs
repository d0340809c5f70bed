//! Google Maps directions client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use agroflow_delivery::{DirectionsError, DirectionsRequest, DirectionsService, RouteDirections, RouteLeg};

const DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

/// Directions client backed by the Google Maps Directions API.
///
/// Constructed without a key it fails fast with `MissingApiKey`, so route
/// planning surfaces a clear configuration error instead of a 4xx from the
/// upstream API.
pub struct GoogleDirectionsClient {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl GoogleDirectionsClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DIRECTIONS_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Point the client at a different endpoint (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    legs: Vec<ApiLeg>,
    #[serde(default)]
    waypoint_order: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct ApiLeg {
    distance: ApiValue,
    duration: ApiValue,
    end_location: ApiLocation,
}

#[derive(Debug, Deserialize)]
struct ApiValue {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl DirectionsService for GoogleDirectionsClient {
    async fn directions(
        &self,
        request: DirectionsRequest,
    ) -> Result<RouteDirections, DirectionsError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(DirectionsError::MissingApiKey)?;

        let waypoints = if request.waypoints.is_empty() {
            None
        } else if request.optimize_waypoints {
            Some(format!("optimize:true|{}", request.waypoints.join("|")))
        } else {
            Some(request.waypoints.join("|"))
        };

        let mut query: Vec<(&str, String)> = vec![
            ("origin", request.origin.clone()),
            ("destination", request.destination.clone()),
            ("key", key.to_string()),
        ];
        if let Some(wp) = waypoints {
            query.push(("waypoints", wp));
        }

        debug!(origin = %request.origin, destination = %request.destination, "requesting directions");

        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| DirectionsError::Request(e.to_string()))?;

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| DirectionsError::Request(e.to_string()))?;

        if body.status != "OK" {
            return Err(DirectionsError::Request(format!(
                "directions API returned status {}",
                body.status
            )));
        }

        let route = body
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| DirectionsError::Request("directions API returned no routes".to_string()))?;

        Ok(RouteDirections {
            legs: route
                .legs
                .into_iter()
                .map(|leg| RouteLeg {
                    distance_m: leg.distance.value,
                    duration_s: leg.duration.value,
                    end_lat: leg.end_location.lat,
                    end_lng: leg.end_location.lng,
                })
                .collect(),
            waypoint_order: route.waypoint_order,
        })
    }
}

/// Directions service that answers every request with uniform legs.
///
/// Dev-mode stand-in when no API key is configured for exploratory use;
/// every leg is `leg_distance_m` metres and `leg_duration_s` seconds.
pub struct UniformDirections {
    pub leg_distance_m: u64,
    pub leg_duration_s: u64,
}

#[async_trait]
impl DirectionsService for UniformDirections {
    async fn directions(
        &self,
        request: DirectionsRequest,
    ) -> Result<RouteDirections, DirectionsError> {
        let legs = request.waypoints.len() + 1;
        Ok(RouteDirections {
            legs: (0..legs)
                .map(|_| RouteLeg {
                    distance_m: self.leg_distance_m,
                    duration_s: self.leg_duration_s,
                    end_lat: 0.0,
                    end_lng: 0.0,
                })
                .collect(),
            waypoint_order: (0..request.waypoints.len()).collect(),
        })
    }
}
