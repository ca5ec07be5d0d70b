use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::constants::{DEG_TO_RAD, SYNODIC_MONTH_DAYS};
use crate::error::ApiError;
use crate::utils::{iso_utc, round1, round2, round_to};

const DAY_MS: f64 = 86_400_000.0;
const J1970: f64 = 2_440_588.0;
const J2000: f64 = 2_451_545.0;
const J0: f64 = 0.0009;
const OBLIQUITY: f64 = 23.4397 * DEG_TO_RAD;
// upper limb on the horizon, with refraction
const SUNRISE_ALTITUDE_DEG: f64 = -0.833;
// new moon of 2000-01-06 18:14 UTC
const REFERENCE_NEW_MOON_JD: f64 = 2_451_550.26;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Twilight {
    pub dawn: Option<String>,
    pub dusk: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoonInfo {
    pub phase: f64,
    pub illumination: f64,
    pub age_days: f64,
    pub name: &'static str,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemerisPayload {
    pub date: String,
    pub latitude: f64,
    pub longitude: f64,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub solar_noon: String,
    pub day_length_minutes: Option<f64>,
    pub civil_twilight: Twilight,
    pub nautical_twilight: Twilight,
    pub astronomical_twilight: Twilight,
    pub moon: MoonInfo,
}

pub fn parse_date(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(Utc::now().date_naive()),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
            ApiError::BadRequest("Invalid date query parameter. Expected YYYY-MM-DD.".to_string())
        }),
    }
}

fn to_julian(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / DAY_MS - 0.5 + J1970
}

fn from_julian(julian: f64) -> Option<DateTime<Utc>> {
    if !julian.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(((julian + 0.5 - J1970) * DAY_MS).round() as i64)
}

fn solar_mean_anomaly(days: f64) -> f64 {
    DEG_TO_RAD * (357.5291 + 0.985_600_28 * days)
}

fn ecliptic_longitude(mean_anomaly: f64) -> f64 {
    let center = DEG_TO_RAD
        * (1.9148 * mean_anomaly.sin()
            + 0.02 * (2.0 * mean_anomaly).sin()
            + 0.0003 * (3.0 * mean_anomaly).sin());
    let perihelion = DEG_TO_RAD * 102.9372;
    mean_anomaly + center + perihelion + std::f64::consts::PI
}

fn declination(longitude: f64) -> f64 {
    (OBLIQUITY.sin() * longitude.sin()).asin()
}

fn approx_transit(hour_angle: f64, west_lon: f64, cycle: f64) -> f64 {
    J0 + (hour_angle + west_lon) / std::f64::consts::TAU + cycle
}

fn transit_julian(approx: f64, mean_anomaly: f64, longitude: f64) -> f64 {
    J2000 + approx + 0.0053 * mean_anomaly.sin() - 0.0069 * (2.0 * longitude).sin()
}

struct SolarDay {
    west_lon: f64,
    phi: f64,
    cycle: f64,
    mean_anomaly: f64,
    longitude: f64,
    declination: f64,
    noon: f64,
}

impl SolarDay {
    fn new(date: NaiveDate, lat: f64, lon: f64) -> Self {
        let noon_utc = date
            .and_hms_opt(12, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or_default();
        let west_lon = -lon * DEG_TO_RAD;
        let days = to_julian(noon_utc) - J2000;
        let cycle = (days - J0 - west_lon / std::f64::consts::TAU).round();
        let approx = approx_transit(0.0, west_lon, cycle);
        let mean_anomaly = solar_mean_anomaly(approx);
        let longitude = ecliptic_longitude(mean_anomaly);
        Self {
            west_lon,
            phi: lat * DEG_TO_RAD,
            cycle,
            mean_anomaly,
            longitude,
            declination: declination(longitude),
            noon: transit_julian(approx, mean_anomaly, longitude),
        }
    }

    /// Julian dates at which the sun crosses `altitude_deg`, or `None` when it
    /// stays above or below it all day.
    fn crossing(&self, altitude_deg: f64) -> Option<(f64, f64)> {
        let cos_hour_angle = ((altitude_deg * DEG_TO_RAD).sin()
            - self.phi.sin() * self.declination.sin())
            / (self.phi.cos() * self.declination.cos());
        if !(-1.0..=1.0).contains(&cos_hour_angle) {
            return None;
        }
        let hour_angle = cos_hour_angle.acos();
        let set = transit_julian(
            approx_transit(hour_angle, self.west_lon, self.cycle),
            self.mean_anomaly,
            self.longitude,
        );
        Some((self.noon - (set - self.noon), set))
    }

    fn noon_altitude_deg(&self) -> f64 {
        90.0 - (self.phi - self.declination).abs() / DEG_TO_RAD
    }

    fn twilight(&self, altitude_deg: f64) -> Twilight {
        let crossing = self.crossing(altitude_deg);
        Twilight {
            dawn: crossing.and_then(|(rise, _)| from_julian(rise)).map(iso_utc),
            dusk: crossing.and_then(|(_, set)| from_julian(set)).map(iso_utc),
        }
    }
}

pub fn moon_info(at: DateTime<Utc>) -> MoonInfo {
    let age_days = (to_julian(at) - REFERENCE_NEW_MOON_JD).rem_euclid(SYNODIC_MONTH_DAYS);
    let phase = age_days / SYNODIC_MONTH_DAYS;
    let illumination = (1.0 - (phase * std::f64::consts::TAU).cos()) / 2.0;
    MoonInfo {
        phase: round_to(phase, 3),
        illumination: round_to(illumination, 3),
        age_days: round1(age_days),
        name: phase_name(phase),
    }
}

fn phase_name(phase: f64) -> &'static str {
    const NAMES: [&str; 8] = [
        "New Moon",
        "Waxing Crescent",
        "First Quarter",
        "Waxing Gibbous",
        "Full Moon",
        "Waning Gibbous",
        "Last Quarter",
        "Waning Crescent",
    ];
    let index = ((phase * 8.0).round() as usize) % NAMES.len();
    NAMES[index]
}

pub fn compute(date: NaiveDate, lat: f64, lon: f64) -> EphemerisPayload {
    let day = SolarDay::new(date, lat, lon);
    let sun = day.crossing(SUNRISE_ALTITUDE_DEG);
    let sunrise = sun.and_then(|(rise, _)| from_julian(rise));
    let sunset = sun.and_then(|(_, set)| from_julian(set));
    let solar_noon = from_julian(day.noon);

    let day_length_minutes = match (sunrise, sunset) {
        (Some(rise), Some(set)) => Some(round1((set - rise).num_seconds() as f64 / 60.0)),
        _ if sun.is_some() => None,
        // polar day or polar night
        _ if day.noon_altitude_deg() > SUNRISE_ALTITUDE_DEG => Some(24.0 * 60.0),
        _ => Some(0.0),
    };

    EphemerisPayload {
        date: date.format("%Y-%m-%d").to_string(),
        latitude: round2(lat),
        longitude: round2(lon),
        sunrise: sunrise.map(iso_utc),
        sunset: sunset.map(iso_utc),
        solar_noon: solar_noon.map(iso_utc).unwrap_or_default(),
        day_length_minutes,
        civil_twilight: day.twilight(-6.0),
        nautical_twilight: day.twilight(-12.0),
        astronomical_twilight: day.twilight(-18.0),
        moon: moon_info(solar_noon.unwrap_or_else(Utc::now)),
    }
}
