//! Field geometry helpers: even-odd point-in-polygon and GeoJSON access.

use serde_json::Value as JsonValue;

/// Even-odd ray casting: cast a ray from `point` along +x and count edge
/// crossings. Vertices are `(x, y)` pairs; the polygon is closed implicitly.
pub fn is_in_location(point: (f64, f64), polygon: &[(f64, f64)]) -> bool {
    if polygon.is_empty() {
        return false;
    }

    let (x, y) = point;
    let mut inside = false;

    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];

        let intersect = ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi);
        if intersect {
            inside = !inside;
        }

        j = i;
    }

    inside
}

fn feature_geometry(location: &JsonValue) -> Option<&JsonValue> {
    location.get("features")?.get(0)?.get("geometry")
}

/// Geometry type of the first feature in a stored GeoJSON location.
pub fn get_geometry_type(location: &JsonValue) -> Option<&str> {
    feature_geometry(location)?.get("type")?.as_str()
}

/// Coordinates of the first feature in a stored GeoJSON location.
pub fn get_coordinates(location: &JsonValue) -> Option<&JsonValue> {
    feature_geometry(location)?.get("coordinates")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SQUARE: [(f64, f64); 4] = [(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0)];

    #[test]
    fn point_inside_the_square() {
        assert!(is_in_location((1.0, 1.0), &SQUARE));
    }

    #[test]
    fn point_outside_the_square() {
        assert!(!is_in_location((3.0, 3.0), &SQUARE));
    }

    #[test]
    fn concave_polygon_notch_is_outside() {
        // U shape: the notch between the arms is outside.
        let polygon = [
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, 3.0),
            (3.0, 3.0),
            (3.0, 1.0),
            (1.0, 1.0),
            (1.0, 3.0),
            (0.0, 3.0),
        ];
        assert!(!is_in_location((2.0, 2.0), &polygon));
        assert!(is_in_location((0.5, 2.0), &polygon));
        assert!(is_in_location((2.0, 0.5), &polygon));
    }

    #[test]
    fn geojson_helpers_read_the_first_feature() {
        let location = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [0.0, 2.0], [2.0, 2.0], [2.0, 0.0]]]
                }
            }]
        });

        assert_eq!(get_geometry_type(&location), Some("Polygon"));
        let coords = get_coordinates(&location).unwrap();
        assert_eq!(coords[0][2][0].as_f64(), Some(2.0));
    }

    #[test]
    fn helpers_return_none_for_malformed_locations() {
        assert_eq!(get_geometry_type(&json!({})), None);
        assert_eq!(get_coordinates(&json!({"features": []})), None);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn points_beyond_the_bounding_box_are_outside(
                x in 2.0001f64..100.0,
                y in -100.0f64..100.0,
            ) {
                prop_assert!(!is_in_location((x, y), &SQUARE));
            }

            #[test]
            fn strict_interior_of_the_square_is_inside(
                x in 0.0001f64..1.9999,
                y in 0.0001f64..1.9999,
            ) {
                prop_assert!(is_in_location((x, y), &SQUARE));
            }
        }
    }
}
