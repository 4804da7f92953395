use chrono::{Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::driver::{Driver, DriverCandidate, DriverStatus, GeoPoint, VehicleCategory};

const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Fixed average-speed heuristic: 2.5 minutes per mile. Not a routing call.
pub const MINUTES_PER_MILE: f64 = 2.5;

pub fn haversine_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_MILES * central_angle
}

pub fn eta_minutes(distance_miles: f64) -> u32 {
    (distance_miles * MINUTES_PER_MILE).ceil() as u32
}

/// Candidate search over the current driver snapshot.
///
/// Filters to online, active drivers of the requested category whose last
/// location fix is within the freshness window, ranks ascending by distance
/// with rating (descending) breaking ties. An empty result is a normal
/// outcome, not an error.
pub struct GeoIndex<'a> {
    drivers: &'a DashMap<Uuid, Driver>,
    freshness: Duration,
}

impl<'a> GeoIndex<'a> {
    pub fn new(drivers: &'a DashMap<Uuid, Driver>, freshness_secs: i64) -> Self {
        Self {
            drivers,
            freshness: Duration::seconds(freshness_secs),
        }
    }

    pub fn find_candidates(
        &self,
        pickup: &GeoPoint,
        category: &VehicleCategory,
        max_distance_miles: f64,
    ) -> Vec<DriverCandidate> {
        let stale_before = Utc::now() - self.freshness;

        let mut candidates: Vec<DriverCandidate> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                let eligible = driver.status == DriverStatus::Online
                    && driver.is_active
                    && driver.category == *category
                    && driver.location_updated_at >= stale_before;
                if !eligible {
                    return None;
                }

                let distance_miles = haversine_miles(&driver.location, pickup);
                if distance_miles > max_distance_miles {
                    return None;
                }

                Some(DriverCandidate {
                    driver_id: driver.id,
                    distance_miles,
                    pickup_eta_minutes: eta_minutes(distance_miles),
                    rating: driver.rating,
                    category: driver.category.clone(),
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_miles
                .total_cmp(&b.distance_miles)
                .then(b.rating.total_cmp(&a.rating))
        });

        candidates
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use dashmap::DashMap;
    use uuid::Uuid;

    use super::{eta_minutes, haversine_miles, GeoIndex};
    use crate::models::driver::{Driver, DriverStatus, GeoPoint, VehicleCategory};

    const LOOP: GeoPoint = GeoPoint {
        lat: 41.8781,
        lng: -87.6298,
    };
    const ORD: GeoPoint = GeoPoint {
        lat: 41.9786,
        lng: -87.9048,
    };

    fn driver(id_seed: u128, lat: f64, lng: f64, rating: f64) -> Driver {
        Driver {
            id: Uuid::from_u128(id_seed),
            name: format!("driver-{id_seed}"),
            status: DriverStatus::Online,
            is_active: true,
            category: VehicleCategory::new("economy"),
            rating,
            location: GeoPoint { lat, lng },
            location_updated_at: Utc::now(),
        }
    }

    fn index_with(drivers: Vec<Driver>) -> DashMap<Uuid, Driver> {
        let map = DashMap::new();
        for d in drivers {
            map.insert(d.id, d);
        }
        map
    }

    #[test]
    fn zero_distance_for_same_point() {
        assert!(haversine_miles(&LOOP, &LOOP) < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = haversine_miles(&LOOP, &ORD);
        let ba = haversine_miles(&ORD, &LOOP);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn loop_to_ord_is_around_16_miles() {
        let distance = haversine_miles(&LOOP, &ORD);
        assert!((distance - 15.8).abs() < 1.0, "got {distance}");
    }

    #[test]
    fn eta_is_ceil_of_two_and_a_half_minutes_per_mile() {
        assert_eq!(eta_minutes(0.0), 0);
        assert_eq!(eta_minutes(1.0), 3);
        assert_eq!(eta_minutes(4.0), 10);
        assert_eq!(eta_minutes(4.1), 11);
    }

    #[test]
    fn filters_offline_inactive_wrong_category_and_stale() {
        let mut offline = driver(1, 41.88, -87.63, 4.5);
        offline.status = DriverStatus::Offline;

        let mut inactive = driver(2, 41.88, -87.63, 4.5);
        inactive.is_active = false;

        let mut premium = driver(3, 41.88, -87.63, 4.5);
        premium.category = VehicleCategory::new("premium");

        let mut stale = driver(4, 41.88, -87.63, 4.5);
        stale.location_updated_at = Utc::now() - Duration::seconds(600);

        let eligible = driver(5, 41.88, -87.63, 4.5);

        let map = index_with(vec![offline, inactive, premium, stale, eligible]);
        let found = GeoIndex::new(&map, 300).find_candidates(
            &LOOP,
            &VehicleCategory::new("economy"),
            10.0,
        );

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].driver_id, Uuid::from_u128(5));
    }

    #[test]
    fn excludes_drivers_beyond_max_distance() {
        // ORD is ~16 miles from the Loop.
        let far = driver(1, ORD.lat, ORD.lng, 5.0);
        let near = driver(2, 41.885, -87.64, 4.0);

        let map = index_with(vec![far, near]);
        let found = GeoIndex::new(&map, 300).find_candidates(
            &LOOP,
            &VehicleCategory::new("economy"),
            10.0,
        );

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].driver_id, Uuid::from_u128(2));
    }

    #[test]
    fn ranked_by_distance_then_rating() {
        let far_high = driver(1, 41.95, -87.70, 5.0);
        let near_low = driver(2, 41.879, -87.630, 3.5);
        let tied_low = driver(3, 41.8800, -87.6300, 4.0);
        let tied_high = driver(4, 41.8800, -87.6300, 4.9);

        let map = index_with(vec![far_high, near_low, tied_low, tied_high]);
        let found = GeoIndex::new(&map, 300).find_candidates(
            &LOOP,
            &VehicleCategory::new("economy"),
            10.0,
        );

        let order: Vec<Uuid> = found.iter().map(|c| c.driver_id).collect();
        assert_eq!(
            order,
            vec![
                Uuid::from_u128(2),
                Uuid::from_u128(4),
                Uuid::from_u128(3),
                Uuid::from_u128(1),
            ]
        );

        for pair in found.windows(2) {
            assert!(pair[0].distance_miles <= pair[1].distance_miles);
        }
    }

    #[test]
    fn empty_snapshot_yields_empty_result() {
        let map = index_with(vec![]);
        let found = GeoIndex::new(&map, 300).find_candidates(
            &LOOP,
            &VehicleCategory::new("economy"),
            10.0,
        );
        assert!(found.is_empty());
    }
}
