use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "https://codequest.app",
    "https://www.codequest.app",
];

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    server: ServerSettings,
    runtime: RuntimeSettings,
    api: ApiSettings,
    cors: CorsSettings,
    database: DatabaseSettings,
    grader: GraderSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    host: ServerHost,
    port: ServerPort,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) project_name: String,
    pub(crate) version: String,
    pub(crate) api_v1_str: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(crate) postgres_server: String,
    pub(crate) postgres_port: u16,
    pub(crate) postgres_user: String,
    pub(crate) postgres_password: String,
    pub(crate) postgres_db: String,
    pub(crate) database_url: Option<String>,
}

/// Resource and scheduling knobs for the execution sandbox and the
/// grading orchestrator.
#[derive(Debug, Clone)]
pub(crate) struct GraderSettings {
    pub(crate) backend: SandboxBackend,
    pub(crate) isolate_bin: String,
    pub(crate) isolate_boxes: u32,
    pub(crate) case_timeout_secs: u64,
    pub(crate) memory_limit_mb: u64,
    pub(crate) concurrency: usize,
    pub(crate) submission_budget_secs: u64,
    pub(crate) sandbox_fault_attempts: u32,
    pub(crate) sandbox_fault_backoff_ms: u64,
}

impl GraderSettings {
    pub(crate) fn case_timeout(&self) -> Duration {
        Duration::from_secs(self.case_timeout_secs)
    }

    pub(crate) fn submission_budget(&self) -> Duration {
        Duration::from_secs(self.submission_budget_secs)
    }

    pub(crate) fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.sandbox_fault_backoff_ms)
    }

    pub(crate) fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SandboxBackend {
    Process,
    Isolate,
}

impl SandboxBackend {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SandboxBackend::Process => "process",
            SandboxBackend::Isolate => "isolate",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ServerHost(String);

#[derive(Debug, Clone, Copy)]
pub(crate) struct ServerPort(u16);

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid server host: {0}")]
    InvalidHost(String),
    #[error("invalid server port: {0}")]
    InvalidPort(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("CODEQUEST_HOST", "0.0.0.0");
        let port = env_or_default("CODEQUEST_PORT", "8000");

        let environment =
            parse_environment(env_optional("CODEQUEST_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config = env_optional("CODEQUEST_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "CodeQuest Grader");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "codequest");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "codequest_db");
        let database_url = env_optional("DATABASE_URL");

        let backend = parse_backend(env_or_default("GRADER_BACKEND", "process"))?;
        let isolate_bin = env_or_default("GRADER_ISOLATE_BIN", "isolate");
        let isolate_boxes =
            parse_u32("GRADER_ISOLATE_BOXES", env_or_default("GRADER_ISOLATE_BOXES", "8"))?;
        let case_timeout_secs = parse_u64(
            "GRADER_CASE_TIMEOUT_SECS",
            env_or_default("GRADER_CASE_TIMEOUT_SECS", "5"),
        )?;
        let memory_limit_mb =
            parse_u64("GRADER_MEMORY_LIMIT_MB", env_or_default("GRADER_MEMORY_LIMIT_MB", "256"))?;
        let concurrency =
            parse_u64("GRADER_CONCURRENCY", env_or_default("GRADER_CONCURRENCY", "4"))? as usize;
        let submission_budget_secs = parse_u64(
            "GRADER_SUBMISSION_BUDGET_SECS",
            env_or_default("GRADER_SUBMISSION_BUDGET_SECS", "60"),
        )?;
        let sandbox_fault_attempts = parse_u32(
            "GRADER_FAULT_ATTEMPTS",
            env_or_default("GRADER_FAULT_ATTEMPTS", "3"),
        )?;
        let sandbox_fault_backoff_ms = parse_u64(
            "GRADER_FAULT_BACKOFF_MS",
            env_or_default("GRADER_FAULT_BACKOFF_MS", "200"),
        )?;

        let log_level = env_or_default("CODEQUEST_LOG_LEVEL", "info");
        let json = env_optional("CODEQUEST_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let prometheus_enabled = env_optional("PROMETHEUS_ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            grader: GraderSettings {
                backend,
                isolate_bin,
                isolate_boxes,
                case_timeout_secs,
                memory_limit_mb,
                concurrency,
                submission_budget_secs,
                sandbox_fault_attempts,
                sandbox_fault_backoff_ms,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn grader(&self) -> &GraderSettings {
        &self.grader
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.grader.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADER_CONCURRENCY",
                value: String::from("0"),
            });
        }
        if self.grader.case_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADER_CASE_TIMEOUT_SECS",
                value: String::from("0"),
            });
        }
        if self.grader.memory_limit_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADER_MEMORY_LIMIT_MB",
                value: String::from("0"),
            });
        }
        if self.grader.backend == SandboxBackend::Isolate && self.grader.isolate_boxes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADER_ISOLATE_BOXES",
                value: String::from("0"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_backend(value: String) -> Result<SandboxBackend, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "process" => Ok(SandboxBackend::Process),
        "isolate" => Ok(SandboxBackend::Isolate),
        _ => Err(ConfigError::InvalidValue { field: "GRADER_BACKEND", value }),
    }
}

fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(DEFAULT_CORS_ORIGINS.iter().map(|item| item.to_string()).collect());
    };

    if raw.trim().is_empty() {
        return Ok(DEFAULT_CORS_ORIGINS.iter().map(|item| item.to_string()).collect());
    }

    if raw.trim_start().starts_with('[') {
        let parsed: Vec<String> =
            serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidCors(raw.clone()))?;
        if parsed.is_empty() {
            return Ok(DEFAULT_CORS_ORIGINS.iter().map(|item| item.to_string()).collect());
        }
        return Ok(parsed);
    }

    let items: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        return Ok(DEFAULT_CORS_ORIGINS.iter().map(|item| item.to_string()).collect());
    }

    Ok(items)
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|val| val.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}
