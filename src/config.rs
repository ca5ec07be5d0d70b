use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::constants::{
    DEFAULT_CHART_WINDOW, DEFAULT_LISTEN_ADDR, DEFAULT_REALTIME_TTL_SECONDS,
    DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_SLOW_TTL_SECONDS, DEFAULT_STATIC_DIR,
    DEFAULT_TILE_CACHE_MAX_ENTRIES, DEFAULT_TILE_TTL_SECONDS, DEFAULT_WARM_START_DELAY_SECONDS,
    FMI_MAGNETOMETER_TEXT_TEMPLATE, FMI_RADAR_WMS_URL, FMI_WFS_URL, MAX_SOLAR_WIND_OFFSET_MINUTES,
    NOAA_KP_URL, NOAA_MAG_URL, NOAA_PLASMA_URL, OPEN_METEO_URL, PROXIED_IMAGE_URL, STATIONS,
    Station,
};

#[derive(Clone, Debug)]
pub struct Upstreams {
    pub plasma_url: String,
    pub mag_url: String,
    pub kp_url: String,
    pub magnetometer_wfs_url: String,
    pub magnetometer_text_template: String,
    pub weather_url: String,
    pub radar_wms_url: String,
    pub proxied_image_url: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: String,
    pub static_dir: PathBuf,
    pub request_timeout: Duration,
    pub realtime_ttl: Duration,
    pub slow_ttl: Duration,
    pub tile_ttl: Duration,
    pub warm_interval: Duration,
    pub warm_start_delay: Duration,
    pub chart_window: usize,
    pub solar_wind_offset_minutes: i64,
    pub tile_cache_max_entries: usize,
    pub station_ids: HashMap<&'static str, u32>,
    pub upstreams: Upstreams,
}

impl Config {
    pub fn fmisid(&self, station: &Station) -> u32 {
        self.station_ids
            .get(station.code)
            .copied()
            .unwrap_or(station.fmisid)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let realtime_ttl = Duration::from_secs(
            env.u64("SPACEWX_REALTIME_TTL_SECONDS", DEFAULT_REALTIME_TTL_SECONDS)?,
        );
        let warm_interval = Duration::from_secs(
            env.u64("SPACEWX_WARM_INTERVAL_SECONDS", realtime_ttl.as_secs())?
                .max(1),
        );

        Ok(Self {
            listen_addr: env.string("SPACEWX_LISTEN_ADDR", DEFAULT_LISTEN_ADDR),
            static_dir: PathBuf::from(env.string("SPACEWX_STATIC_DIR", DEFAULT_STATIC_DIR)),
            request_timeout: Duration::from_secs(env.u64(
                "SPACEWX_REQUEST_TIMEOUT_SECONDS",
                DEFAULT_REQUEST_TIMEOUT_SECONDS,
            )?),
            realtime_ttl,
            slow_ttl: Duration::from_secs(
                env.u64("SPACEWX_SLOW_TTL_SECONDS", DEFAULT_SLOW_TTL_SECONDS)?,
            ),
            tile_ttl: Duration::from_secs(
                env.u64("SPACEWX_TILE_TTL_SECONDS", DEFAULT_TILE_TTL_SECONDS)?,
            ),
            warm_interval,
            warm_start_delay: Duration::from_secs(env.u64(
                "SPACEWX_WARM_START_DELAY_SECONDS",
                DEFAULT_WARM_START_DELAY_SECONDS,
            )?),
            chart_window: (env.u64("SPACEWX_CHART_WINDOW", DEFAULT_CHART_WINDOW as u64)? as usize)
                .max(1),
            solar_wind_offset_minutes: env.i64_within(
                "SPACEWX_SOLAR_WIND_TIME_OFFSET_MINUTES",
                0,
                -MAX_SOLAR_WIND_OFFSET_MINUTES,
                MAX_SOLAR_WIND_OFFSET_MINUTES,
            )?,
            tile_cache_max_entries: env.u64(
                "SPACEWX_TILE_CACHE_MAX_ENTRIES",
                DEFAULT_TILE_CACHE_MAX_ENTRIES as u64,
            )? as usize,
            station_ids: match env.optional("SPACEWX_MAGNETOMETER_FMISIDS") {
                Some(raw) => parse_station_ids(&raw)
                    .context("Failed to parse SPACEWX_MAGNETOMETER_FMISIDS")?,
                None => HashMap::new(),
            },
            upstreams: Upstreams {
                plasma_url: env.string("SPACEWX_PLASMA_URL", NOAA_PLASMA_URL),
                mag_url: env.string("SPACEWX_MAG_URL", NOAA_MAG_URL),
                kp_url: env.string("SPACEWX_KP_URL", NOAA_KP_URL),
                magnetometer_wfs_url: env.string("SPACEWX_MAGNETOMETER_WFS_URL", FMI_WFS_URL),
                magnetometer_text_template: env.string(
                    "SPACEWX_MAGNETOMETER_TEXT_TEMPLATE",
                    FMI_MAGNETOMETER_TEXT_TEMPLATE,
                ),
                weather_url: env.string("SPACEWX_WEATHER_URL", OPEN_METEO_URL),
                radar_wms_url: env.string("SPACEWX_RADAR_WMS_URL", FMI_RADAR_WMS_URL),
                proxied_image_url: env.string("SPACEWX_PROXIED_IMAGE_URL", PROXIED_IMAGE_URL),
            },
        })
    }
}

// `CODE=fmisid` pairs separated by commas, e.g. `NUR=101149,SOD=101932`
fn parse_station_ids(raw: &str) -> Result<HashMap<&'static str, u32>> {
    let mut ids = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (code, id) = pair
            .split_once('=')
            .with_context(|| format!("Expected CODE=fmisid, got {pair}"))?;
        let station = STATIONS
            .iter()
            .find(|station| station.code.eq_ignore_ascii_case(code.trim()))
            .with_context(|| format!("Unknown magnetometer station {}", code.trim()))?;
        let id = id
            .trim()
            .parse::<u32>()
            .with_context(|| format!("Failed to parse fmisid for {}", station.code))?;
        ids.insert(station.code, id);
    }
    Ok(ids)
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.optional(name)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| default.to_string())
    }

    fn u64(&self, name: &str, default: u64) -> Result<u64> {
        match self.optional(name) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Failed to parse {}={} as u64", name, value)),
            None => Ok(default),
        }
    }

    fn i64(&self, name: &str, default: i64) -> Result<i64> {
        match self.optional(name) {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Failed to parse {}={} as i64", name, value)),
            None => Ok(default),
        }
    }

    fn i64_within(&self, name: &str, default: i64, min_value: i64, max_value: i64) -> Result<i64> {
        let value = self.i64(name, default)?;
        if !(min_value..=max_value).contains(&value) {
            anyhow::bail!("{name}={value} is outside {min_value}..={max_value}");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(cfg.realtime_ttl, Duration::from_secs(240));
        assert_eq!(cfg.slow_ttl, Duration::from_secs(600));
        assert_eq!(cfg.warm_interval, cfg.realtime_ttl);
        assert_eq!(cfg.chart_window, 60);
        assert_eq!(cfg.upstreams.plasma_url, NOAA_PLASMA_URL);
    }

    #[test]
    fn warm_interval_follows_realtime_ttl_unless_overridden() {
        let cfg = config_from(&[("SPACEWX_REALTIME_TTL_SECONDS", "90")]).unwrap();
        assert_eq!(cfg.warm_interval, Duration::from_secs(90));

        let cfg = config_from(&[
            ("SPACEWX_REALTIME_TTL_SECONDS", "90"),
            ("SPACEWX_WARM_INTERVAL_SECONDS", "30"),
        ])
        .unwrap();
        assert_eq!(cfg.warm_interval, Duration::from_secs(30));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config_from(&[("SPACEWX_KP_URL", "   ")]).unwrap();
        assert_eq!(cfg.upstreams.kp_url, NOAA_KP_URL);
    }

    #[test]
    fn unparseable_numbers_are_rejected() {
        let error = config_from(&[("SPACEWX_SLOW_TTL_SECONDS", "ten")]).unwrap_err();
        assert!(error.to_string().contains("SPACEWX_SLOW_TTL_SECONDS"));
    }

    #[test]
    fn negative_offsets_are_accepted() {
        let cfg = config_from(&[("SPACEWX_SOLAR_WIND_TIME_OFFSET_MINUTES", "-5")]).unwrap();
        assert_eq!(cfg.solar_wind_offset_minutes, -5);
    }

    #[test]
    fn station_ids_can_be_overridden() {
        let cfg = config_from(&[("SPACEWX_MAGNETOMETER_FMISIDS", "nur=4242, SOD=77")]).unwrap();
        let nur = STATIONS.iter().find(|station| station.code == "NUR").unwrap();
        let kev = STATIONS.iter().find(|station| station.code == "KEV").unwrap();
        assert_eq!(cfg.fmisid(nur), 4242);
        assert_eq!(cfg.fmisid(kev), kev.fmisid);

        assert!(config_from(&[("SPACEWX_MAGNETOMETER_FMISIDS", "XXX=1")]).is_err());
        assert!(config_from(&[("SPACEWX_MAGNETOMETER_FMISIDS", "NUR=abc")]).is_err());
        assert!(config_from(&[("SPACEWX_MAGNETOMETER_FMISIDS", "NUR")]).is_err());
    }

    #[test]
    fn offsets_beyond_a_day_are_rejected() {
        let error = config_from(&[("SPACEWX_SOLAR_WIND_TIME_OFFSET_MINUTES", "1441")]).unwrap_err();
        assert!(error
            .to_string()
            .contains("SPACEWX_SOLAR_WIND_TIME_OFFSET_MINUTES"));

        let max = i64::MAX.to_string();
        assert!(config_from(&[("SPACEWX_SOLAR_WIND_TIME_OFFSET_MINUTES", max.as_str())]).is_err());
        assert!(config_from(&[("SPACEWX_SOLAR_WIND_TIME_OFFSET_MINUTES", "-1440")]).is_ok());
    }
}
