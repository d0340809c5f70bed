//! Delivery trips: stop scheduling, route planning against an external
//! directions service, and the driver's trip console.

pub mod routing;
pub mod trip;

pub use routing::{
    form_route_list, plan_route, sanitize_address, DirectionsError, DirectionsRequest,
    DirectionsService, RouteDirections, RouteLeg, RoutePlan, RoutePlanError, StopEstimate,
};
pub use trip::{
    trip_status, ApplyRoutePlan, CancelTrip, CreateDeliveryTrip, CustomersNotified, DeliveryStop,
    DeliveryTrip, DeliveryTripCommand, DeliveryTripEvent, DeliveryTripId, DistanceUom, EndTrip,
    MarkCustomersNotified, MarkStopVisited, PauseTrip, ResumeTrip, RoutePlanned, StartTrip,
    StopInput, StopNotification, StopVisited, SubmitTrip, TimeLog, TripCancelled, TripEnded,
    TripPaused, TripPlanned, TripResumed, TripStarted, TripStatus, TripSubmitted,
};
