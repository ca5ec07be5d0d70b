pub const NOAA_PLASMA_URL: &str =
    "https://services.swpc.noaa.gov/products/solar-wind/plasma-1-day.json";
pub const NOAA_MAG_URL: &str = "https://services.swpc.noaa.gov/products/solar-wind/mag-1-day.json";
pub const NOAA_KP_URL: &str = "https://services.swpc.noaa.gov/products/noaa-planetary-k-index.json";
pub const FMI_WFS_URL: &str = "https://opendata.fmi.fi/wfs";
pub const FMI_MAGNETOMETER_STORED_QUERY: &str = "fmi::observations::magnetometer::simple";
pub const FMI_MAGNETOMETER_TEXT_TEMPLATE: &str =
    "https://space.fmi.fi/image/realtime/UT/{station}/{station}data_24.txt";
pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const FMI_RADAR_WMS_URL: &str = "https://openwms.fmi.fi/geoserver/Radar/wms";
pub const PROXIED_IMAGE_URL: &str =
    "https://services.swpc.noaa.gov/images/animations/ovation/north/latest.jpg";

pub const USER_AGENT: &str = "space-weather-api/1.0";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_STATIC_DIR: &str = "public";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_REALTIME_TTL_SECONDS: u64 = 240;
pub const DEFAULT_SLOW_TTL_SECONDS: u64 = 600;
pub const DEFAULT_TILE_TTL_SECONDS: u64 = 240;
pub const DEFAULT_WARM_START_DELAY_SECONDS: u64 = 2;
pub const DEFAULT_CHART_WINDOW: usize = 60;
pub const DEFAULT_TILE_CACHE_MAX_ENTRIES: usize = 512;
pub const MAX_SOLAR_WIND_OFFSET_MINUTES: i64 = 24 * 60;

pub const KP_LOOKBACK_ROWS: usize = 8;

pub const DEFAULT_INSTRUMENT: &str = "DSCOVR";
pub const SPEED_KEYS: [&str; 5] = ["speed", "flow_speed", "proton_speed", "bulk_speed", "v"];
pub const DENSITY_KEYS: [&str; 4] = ["density", "proton_density", "np", "n"];
pub const BZ_KEYS: [&str; 3] = ["bz_gsm", "bz", "bz_gse"];
pub const BT_KEYS: [&str; 3] = ["bt", "b_total", "btotal"];
pub const KP_KEYS: [&str; 3] = ["kp", "kp_index", "estimated_kp"];
pub const SOURCE_KEYS: [&str; 3] = ["source", "spacecraft", "instrument"];

pub const MAGNETOMETER_X_PARAMETER: &str = "MAGNX";
pub const MAGNETOMETER_Z_PARAMETER: &str = "MAGNZ";
pub const MAGNETOMETER_MISSING_SENTINEL: f64 = 99_999.0;
pub const MIN_WINDOW_MINUTES: i64 = 5;
pub const MAX_WINDOW_MINUTES: i64 = 180;
pub const DEFAULT_WINDOW_MINUTES: i64 = 60;
pub const DEFAULT_STATION: &str = "NUR";

pub struct Station {
    pub code: &'static str,
    pub fmisid: u32,
    pub name: &'static str,
}

pub const STATIONS: [Station; 12] = [
    Station {
        code: "KEV",
        fmisid: 101_500,
        name: "Kevo",
    },
    Station {
        code: "KIL",
        fmisid: 101_501,
        name: "Kilpisjärvi",
    },
    Station {
        code: "IVA",
        fmisid: 101_502,
        name: "Ivalo",
    },
    Station {
        code: "MUO",
        fmisid: 101_503,
        name: "Muonio",
    },
    Station {
        code: "SOD",
        fmisid: 101_504,
        name: "Sodankylä",
    },
    Station {
        code: "PEL",
        fmisid: 101_505,
        name: "Pello",
    },
    Station {
        code: "RAN",
        fmisid: 101_506,
        name: "Ranua",
    },
    Station {
        code: "OUJ",
        fmisid: 101_507,
        name: "Oulujärvi",
    },
    Station {
        code: "MEK",
        fmisid: 101_508,
        name: "Mekrijärvi",
    },
    Station {
        code: "HAN",
        fmisid: 101_509,
        name: "Hankasalmi",
    },
    Station {
        code: "NUR",
        fmisid: 101_510,
        name: "Nurmijärvi",
    },
    Station {
        code: "TAR",
        fmisid: 101_511,
        name: "Tartu",
    },
];

pub const RADAR_LAYER_ALLOWLIST: [&str; 4] = [
    "Radar:suomi_dbz_eureffin",
    "Radar:suomi_rr_eureffin",
    "Radar:suomi_rr1h_eureffin",
    "Radar:suomi_rr24h_eureffin",
];
pub const WMS_VERSION: &str = "1.3.0";
pub const WMS_CRS: &str = "EPSG:3857";
pub const WEB_MERCATOR_EXTENT: f64 = 20_037_508.342_789_244;
pub const DEFAULT_TILE_SIZE_PX: u32 = 256;
pub const MIN_TILE_SIZE_PX: u32 = 64;
pub const MAX_TILE_SIZE_PX: u32 = 1024;

pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;
pub const SYNODIC_MONTH_DAYS: f64 = 29.530_588_853;
