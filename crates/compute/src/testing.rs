//! Fixtures shared by the compute unit tests.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use powerwatch_core::config::ModelConfig;
use powerwatch_core::NewReading;
use powerwatch_storage::ReadingStore;

pub fn start_ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2006, 12, 16)
        .and_then(|d| d.and_hms_opt(17, 24, 0))
        .unwrap_or_default()
}

/// Minute-spaced household readings with power in [1, 5] kW and correlated
/// intensity, reactive power and sub-metering.
pub fn normal_readings(n: usize, seed: u64) -> Vec<NewReading> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let p: f64 = rng.gen_range(1.0..5.0);
            let voltage: f64 = rng.gen_range(220.0..240.0);
            NewReading::from_features(
                start_ts() + Duration::minutes(i as i64),
                [
                    Some(p),
                    Some(0.1 + 0.05 * p + rng.gen_range(-0.02..0.02)),
                    Some(voltage),
                    Some(p * 4.2 + rng.gen_range(-0.3..0.3)),
                    Some(0.0),
                    Some(rng.gen_range(0..3) as f64),
                    Some(p * 3.0 + rng.gen_range(-1.0..1.0)),
                ],
            )
        })
        .collect()
}

pub async fn seed_normal_readings(store: &dyn ReadingStore, n: usize, seed: u64) {
    store
        .insert_readings(&normal_readings(n, seed))
        .await
        .expect("seed readings");
}

/// Defaults with a smaller forest so tests stay fast.
pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        n_estimators: 50,
        ..ModelConfig::default()
    }
}
