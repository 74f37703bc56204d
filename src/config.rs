use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub(crate) struct AppConfig {
    pub(crate) jwt_secret: String,
    pub(crate) bind: String,
    pub(crate) database_url: String,
    pub(crate) data_dir: PathBuf,
    pub(crate) python_bin: String,
    pub(crate) converter_script: PathBuf,
    pub(crate) youtube_script: PathBuf,
    pub(crate) process_timeout: Duration,
    pub(crate) token_ttl_hours: i64,
    pub(crate) guest_daily_limit: i64,
    pub(crate) output_ttl: Duration,
    pub(crate) trust_proxy_headers: bool,
    pub(crate) allowed_origins: Vec<String>,
    pub(crate) client_build_dir: Option<PathBuf>,
    pub(crate) admin: Option<AdminSeed>,
}

pub(crate) struct AdminSeed {
    pub(crate) email: String,
    pub(crate) password: String,
    pub(crate) name: String,
}

impl AppConfig {
    pub(crate) fn from_env() -> Self {
        let jwt_secret = required_env_non_empty("JWT_SECRET");
        let bind = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/converter.db".to_string());
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let python_bin = env::var("PYTHON_BIN").unwrap_or_else(|_| "python3".to_string());
        let converter_script = PathBuf::from(
            env::var("CONVERTER_SCRIPT")
                .unwrap_or_else(|_| "converter/convert_batch.py".to_string()),
        );
        let youtube_script = PathBuf::from(
            env::var("YOUTUBE_SCRIPT")
                .unwrap_or_else(|_| "converter/youtube_downloader.py".to_string()),
        );

        let admin = match (optional_env("ADMIN_EMAIL"), optional_env("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password,
                name: optional_env("ADMIN_NAME").unwrap_or_else(|| "Admin".to_string()),
            }),
            _ => None,
        };

        Self {
            jwt_secret,
            bind,
            database_url,
            data_dir,
            python_bin,
            converter_script,
            youtube_script,
            process_timeout: Duration::from_secs(parsed_env("PROCESS_TIMEOUT_SECS", 300)),
            token_ttl_hours: parsed_env("TOKEN_TTL_HOURS", 24),
            guest_daily_limit: parsed_env("GUEST_DAILY_LIMIT", 10),
            output_ttl: Duration::from_secs(parsed_env::<u64>("OUTPUT_TTL_MINUTES", 60) * 60),
            trust_proxy_headers: optional_env("TRUST_PROXY_HEADERS")
                .map(|v| crate::util::parse_bool_loose(&v))
                .unwrap_or(false),
            allowed_origins: parse_origin_list(&env::var("ALLOWED_ORIGINS").unwrap_or_default()),
            client_build_dir: optional_env("CLIENT_BUILD_DIR").map(PathBuf::from),
            admin,
        }
    }

    pub(crate) fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("temp")
    }

    pub(crate) fn outputs_dir(&self) -> PathBuf {
        self.data_dir.join("outputs")
    }
}

fn required_env_non_empty(key: &str) -> String {
    let value = env::var(key).unwrap_or_default();
    if value.is_empty() {
        panic!("{key} must be set");
    }
    value
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> T {
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .unwrap_or_else(|_| panic!("{key} has an invalid value: {raw}")),
        None => default,
    }
}

pub(crate) fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
