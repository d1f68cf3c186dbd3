use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub reservation: ReservationConfig,
    #[serde(default)]
    pub ticket_jobs: TicketJobConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub domain_provider: DomainProviderConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 对外访问地址，用于邮件中的链接
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// 后台允许的跨域来源；为空时放行全部（公开页面可能挂在任意自定义域名上）
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64,  // seconds
    pub refresh_token_expires_in: i64, // seconds
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// 活动未设置时的默认预留分钟数
    pub default_minutes: i64,
    /// 买家可申请的最长预留分钟数
    pub max_minutes: i64,
    /// 单笔订单最多票数（活动自身上限之外的硬上限）
    pub max_tickets_per_order: i64,
    /// 过期扫描间隔（秒）
    pub sweep_interval_secs: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_minutes: 15,
            max_minutes: 24 * 60,
            max_tickets_per_order: 10_000,
            sweep_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketJobConfig {
    /// 小于等于该票数时同步生成
    pub sync_threshold: i64,
    pub batch_size: i64,
    /// 轮询兜底间隔（毫秒）
    pub poll_interval_ms: u64,
    /// watch 接口最长等待（秒）
    pub max_watch_secs: u64,
}

impl Default for TicketJobConfig {
    fn default() -> Self {
        Self {
            sync_threshold: 10_000,
            batch_size: 5_000,
            poll_interval_ms: 2_000,
            max_watch_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub auto_draw_interval_secs: u64,
    pub pending_digest_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_draw_interval_secs: 60,
            pending_digest_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainProviderConfig {
    pub api_base: String,
    pub api_token: String,
    pub project_id: String,
    #[serde(default)]
    pub team_id: Option<String>,
    /// 自定义域名 A 记录应指向的 IP
    pub expected_a_record: String,
    /// 子域名 CNAME 应指向的目标
    pub expected_cname: String,
}

impl Default for DomainProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.vercel.com".to_string(),
            api_token: String::new(),
            project_id: String::new(),
            team_id: None,
            expected_a_record: "76.76.21.21".to_string(),
            expected_cname: "cname.vercel-dns.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// DNS-over-HTTPS JSON 接口
    pub doh_url: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            doh_url: "https://cloudflare-dns.com/dns-query".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    pub bot_token: String,
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                // 有配置文件：先解析再用环境变量覆盖
                toml::from_str(&config_str)
                    .map_err(|e| format!("Failed to parse config file: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 数据库 URL 在无配置文件时必须提供
                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is not set and config.toml was not found")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                        public_base_url: get_env("PUBLIC_BASE_URL")
                            .unwrap_or_else(default_public_base_url),
                        cors_origins: get_env("CORS_ORIGINS")
                            .map(|v| split_list(&v))
                            .unwrap_or_default(),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                        access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 7200i64),
                        refresh_token_expires_in: get_env_parse(
                            "JWT_REFRESH_EXPIRES_IN",
                            2_592_000i64,
                        ),
                    },
                    reservation: ReservationConfig::default(),
                    ticket_jobs: TicketJobConfig::default(),
                    scheduler: SchedulerConfig::default(),
                    domain_provider: DomainProviderConfig::default(),
                    dns: DnsConfig::default(),
                    email: EmailConfig::default(),
                    telegram: TelegramConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("Unable to read config file {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) {
        if let Some(v) = get_env("SERVER_HOST") {
            self.server.host = v;
        }
        override_parse("SERVER_PORT", &mut self.server.port);
        if let Some(v) = get_env("PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Some(v) = get_env("CORS_ORIGINS") {
            self.server.cors_origins = split_list(&v);
        }
        if let Some(v) = get_env("DATABASE_URL") {
            self.database.url = v;
        }
        override_parse("DB_MAX_CONNECTIONS", &mut self.database.max_connections);
        if let Some(v) = get_env("JWT_SECRET") {
            self.jwt.secret = v;
        }
        override_parse("JWT_ACCESS_EXPIRES_IN", &mut self.jwt.access_token_expires_in);
        override_parse("JWT_REFRESH_EXPIRES_IN", &mut self.jwt.refresh_token_expires_in);

        // Reservation / jobs / scheduler
        override_parse("RESERVATION_DEFAULT_MINUTES", &mut self.reservation.default_minutes);
        override_parse("RESERVATION_MAX_MINUTES", &mut self.reservation.max_minutes);
        override_parse(
            "RESERVATION_MAX_TICKETS_PER_ORDER",
            &mut self.reservation.max_tickets_per_order,
        );
        override_parse(
            "RESERVATION_SWEEP_INTERVAL_SECS",
            &mut self.reservation.sweep_interval_secs,
        );
        override_parse("TICKET_JOB_SYNC_THRESHOLD", &mut self.ticket_jobs.sync_threshold);
        override_parse("TICKET_JOB_BATCH_SIZE", &mut self.ticket_jobs.batch_size);
        override_parse("TICKET_JOB_POLL_INTERVAL_MS", &mut self.ticket_jobs.poll_interval_ms);
        override_parse(
            "AUTO_DRAW_INTERVAL_SECS",
            &mut self.scheduler.auto_draw_interval_secs,
        );
        override_parse(
            "PENDING_DIGEST_INTERVAL_SECS",
            &mut self.scheduler.pending_digest_interval_secs,
        );

        // Domain provider
        if let Some(v) = get_env("DOMAIN_PROVIDER_API_BASE") {
            self.domain_provider.api_base = v;
        }
        if let Some(v) = get_env("DOMAIN_PROVIDER_API_TOKEN") {
            self.domain_provider.api_token = v;
        }
        if let Some(v) = get_env("DOMAIN_PROVIDER_PROJECT_ID") {
            self.domain_provider.project_id = v;
        }
        if let Some(v) = get_env("DOMAIN_PROVIDER_TEAM_ID") {
            self.domain_provider.team_id = Some(v);
        }
        if let Some(v) = get_env("DOMAIN_EXPECTED_A_RECORD") {
            self.domain_provider.expected_a_record = v;
        }
        if let Some(v) = get_env("DOMAIN_EXPECTED_CNAME") {
            self.domain_provider.expected_cname = v;
        }
        if let Some(v) = get_env("DNS_DOH_URL") {
            self.dns.doh_url = v;
        }

        // Notifications
        if let Some(v) = get_env("EMAIL_API_URL") {
            self.email.api_url = v;
        }
        if let Some(v) = get_env("EMAIL_API_KEY") {
            self.email.api_key = v;
        }
        if let Some(v) = get_env("EMAIL_FROM_ADDRESS") {
            self.email.from_address = v;
        }
        if let Some(v) = get_env("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
    }
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn override_parse<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(v) = env::var(name)
        && let Ok(parsed) = v.parse()
    {
        *target = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_section_defaults() {
        let raw = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
url = "postgres://localhost/sorteos"
max_connections = 5

[jwt]
secret = "s"
access_token_expires_in = 60
refresh_token_expires_in = 120
"#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.public_base_url, "http://localhost:8080");
        assert_eq!(cfg.reservation.default_minutes, 15);
        assert_eq!(cfg.ticket_jobs.batch_size, 5_000);
        assert_eq!(cfg.domain_provider.expected_a_record, "76.76.21.21");
        assert!(cfg.email.api_key.is_empty());
        assert!(cfg.server.cors_origins.is_empty());
    }

    #[test]
    fn test_split_list_trims_and_skips_empty() {
        assert_eq!(
            split_list(" https://a.example , ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_partial_section_is_rejected_without_required_keys() {
        let raw = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
url = "postgres://localhost/sorteos"
max_connections = 5

[jwt]
secret = "s"
access_token_expires_in = 60
refresh_token_expires_in = 120

[reservation]
default_minutes = 30
"#;
        assert!(toml::from_str::<Config>(raw).is_err());
    }
}
