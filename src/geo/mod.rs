use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::worker::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

#[derive(Debug, Clone, Copy)]
struct Fix {
    point: GeoPoint,
    recorded_at: DateTime<Utc>,
}

/// Last-known worker positions. Read-heavy; writes are last-writer-wins by
/// the device timestamp so out-of-order pushes never move a worker backwards.
///
/// Serves the status-agnostic nearby listing. Candidate search goes through
/// `WorkerStore::find_available_near`, and both are written together.
#[derive(Debug, Default)]
pub struct GeoIndex {
    fixes: DashMap<Uuid, Fix>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the fix was applied.
    pub fn update(&self, worker_id: Uuid, point: GeoPoint, recorded_at: DateTime<Utc>) -> bool {
        let mut entry = self.fixes.entry(worker_id).or_insert(Fix { point, recorded_at });
        if recorded_at > entry.recorded_at {
            *entry = Fix { point, recorded_at };
            true
        } else {
            entry.point == point && entry.recorded_at == recorded_at
        }
    }

    pub fn remove(&self, worker_id: &Uuid) {
        self.fixes.remove(worker_id);
    }

    pub fn position(&self, worker_id: &Uuid) -> Option<(GeoPoint, DateTime<Utc>)> {
        self.fixes
            .get(worker_id)
            .map(|fix| (fix.point, fix.recorded_at))
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Workers within `radius_km` of `origin`, nearest first (ties by id).
    pub fn near(&self, origin: &GeoPoint, radius_km: f64, limit: usize) -> Vec<(Uuid, f64)> {
        let mut hits: Vec<(Uuid, f64)> = self
            .fixes
            .iter()
            .filter_map(|entry| {
                let distance = haversine_km(origin, &entry.value().point);
                (distance <= radius_km).then_some((*entry.key(), distance))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{haversine_km, GeoIndex};
    use crate::models::worker::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(53.5511, 9.9937);
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn lagos_to_abuja_is_between_400_and_500_km() {
        let lagos = GeoPoint::new(6.5244, 3.3792);
        let abuja = GeoPoint::new(9.0765, 7.3986);
        let distance = haversine_km(&lagos, &abuja);
        assert!(distance > 400.0 && distance < 500.0, "got {distance}");
    }

    #[test]
    fn near_orders_by_distance_and_respects_radius_and_limit() {
        let index = GeoIndex::new();
        let now = Utc::now();
        let origin = GeoPoint::new(6.5244, 3.3792);

        let close = Uuid::from_u128(1);
        let mid = Uuid::from_u128(2);
        let far = Uuid::from_u128(3);
        index.update(far, GeoPoint::new(9.0765, 7.3986), now);
        index.update(mid, GeoPoint::new(6.5600, 3.3792), now);
        index.update(close, GeoPoint::new(6.5250, 3.3792), now);

        let hits = index.near(&origin, 20.0, 10);
        let ids: Vec<Uuid> = hits.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![close, mid]);

        let limited = index.near(&origin, 20.0, 1);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].0, close);
    }

    #[test]
    fn stale_update_is_ignored() {
        let index = GeoIndex::new();
        let worker = Uuid::new_v4();
        let now = Utc::now();

        assert!(index.update(worker, GeoPoint::new(1.0, 1.0), now));
        assert!(!index.update(worker, GeoPoint::new(2.0, 2.0), now - Duration::seconds(10)));
        assert!(index.update(worker, GeoPoint::new(3.0, 3.0), now + Duration::seconds(10)));

        let (point, _) = index.position(&worker).unwrap();
        assert_eq!(point.lat, 3.0);
    }
}
