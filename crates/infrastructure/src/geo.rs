use application::GeoDistanceProvider;
use async_trait::async_trait;
use domain::{RepositoryError, UserId};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repository::map_sqlx_err;

/// 地球半径（英里）
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// 两点间的大圆距离（英里）
pub fn haversine_miles(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

#[derive(Debug, FromRow)]
struct LocationRecord {
    user_id: Uuid,
    lat: f32,
    lng: f32,
}

/// 基于 `profiles.lat/lng` 计算距离
#[derive(Clone)]
pub struct PgGeoDistanceProvider {
    pool: PgPool,
}

impl PgGeoDistanceProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GeoDistanceProvider for PgGeoDistanceProvider {
    async fn distance_between(&self, a: UserId, b: UserId) -> Result<Option<f64>, RepositoryError> {
        let records = sqlx::query_as::<_, LocationRecord>(
            r#"
            SELECT user_id, lat, lng FROM profiles
            WHERE user_id = ANY($1) AND lat IS NOT NULL AND lng IS NOT NULL
            "#,
        )
        .bind(vec![Uuid::from(a), Uuid::from(b)])
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let find = |id: UserId| {
            records
                .iter()
                .find(|r| r.user_id == Uuid::from(id))
                .map(|r| (f64::from(r.lat), f64::from(r.lng)))
        };
        Ok(match (find(a), find(b)) {
            (Some((lat1, lng1)), Some((lat2, lng2))) => {
                Some(haversine_miles(lat1, lng1, lat2, lng2))
            }
            _ => None,
        })
    }
}
