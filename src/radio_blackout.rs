use std::sync::Arc;

use rand::Rng;
use serde::Serialize;

use crate::types::{AppState, DataSource};
use crate::utils::now_iso;

pub const CACHE_KEY: &str = "radio-blackout";

/// NOAA R-scale thresholds on 0.1-0.8 nm X-ray flux (W/m²), highest first.
const R_SCALE: [(f64, &str, &str); 5] = [
    (2e-3, "R5", "Extreme"),
    (1e-3, "R4", "Severe"),
    (1e-4, "R3", "Strong"),
    (5e-5, "R2", "Moderate"),
    (1e-5, "R1", "Minor"),
];

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioBlackoutPayload {
    pub source: DataSource,
    pub level: &'static str,
    pub description: &'static str,
    pub xray_flux: f64,
    pub updated_at: String,
}

pub fn classify(xray_flux: f64) -> (&'static str, &'static str) {
    R_SCALE
        .iter()
        .find(|(threshold, _, _)| xray_flux >= *threshold)
        .map(|(_, level, description)| (*level, *description))
        .unwrap_or(("R0", "None"))
}

pub async fn load(state: &AppState) -> Arc<RadioBlackoutPayload> {
    state
        .caches
        .radio_blackout
        .get_or_fetch(CACHE_KEY, || async { Arc::new(synthetic()) })
        .await
}

pub fn synthetic() -> RadioBlackoutPayload {
    let exponent = rand::thread_rng().gen_range(-7.5..=-4.2);
    let xray_flux = 10f64.powf(exponent);
    let (level, description) = classify(xray_flux);
    RadioBlackoutPayload {
        source: DataSource::Synthetic,
        level,
        description,
        xray_flux,
        updated_at: now_iso(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flux_maps_to_r_scale() {
        assert_eq!(classify(1e-7), ("R0", "None"));
        assert_eq!(classify(1e-5), ("R1", "Minor"));
        assert_eq!(classify(7e-5), ("R2", "Moderate"));
        assert_eq!(classify(1.5e-4), ("R3", "Strong"));
        assert_eq!(classify(1e-3), ("R4", "Severe"));
        assert_eq!(classify(5e-3), ("R5", "Extreme"));
    }

    #[test]
    fn synthetic_status_is_consistent_with_its_flux() {
        for _ in 0..50 {
            let payload = synthetic();
            assert_eq!(classify(payload.xray_flux).0, payload.level);
            assert!(payload.level <= "R3");
        }
    }
}
