use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub identity: IdentityBackend,
}

/// Which primary identity provider backs the service.
#[derive(Debug, Clone)]
pub enum IdentityBackend {
    /// Accounts and sessions kept in this service's own database.
    Local {
        jwt_secret: String,
        access_token_ttl: i64,
    },
    /// A hosted Supabase Auth (GoTrue) instance. A missing service-role key
    /// is not fatal at startup; each request needing it fails instead.
    GoTrue {
        url: String,
        service_role_key: Option<String>,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;

        let host: IpAddr = env_or("SUPERFRAIS_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid SUPERFRAIS_HOST: {e}"))?;

        let port: u16 = env_or("SUPERFRAIS_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid SUPERFRAIS_PORT: {e}"))?;

        let log_level = env_or("SUPERFRAIS_LOG_LEVEL", "info");

        let identity = match env_or("SUPERFRAIS_IDENTITY_BACKEND", "local").as_str() {
            "local" => {
                let jwt_secret = env_required("JWT_SECRET")?;
                let access_token_ttl: i64 = env_or("SUPERFRAIS_ACCESS_TOKEN_TTL", "900")
                    .parse()
                    .map_err(|e| format!("Invalid SUPERFRAIS_ACCESS_TOKEN_TTL: {e}"))?;
                if access_token_ttl <= 0 {
                    return Err("SUPERFRAIS_ACCESS_TOKEN_TTL must be positive".to_string());
                }
                IdentityBackend::Local {
                    jwt_secret,
                    access_token_ttl,
                }
            }
            "gotrue" => IdentityBackend::GoTrue {
                url: env_required("SUPABASE_URL")?,
                service_role_key: std::env::var("SERVICE_ROLE_KEY")
                    .or_else(|_| std::env::var("SUPABASE_SERVICE_ROLE_KEY"))
                    .ok()
                    .filter(|k| !k.is_empty()),
            },
            other => {
                return Err(format!(
                    "Invalid SUPERFRAIS_IDENTITY_BACKEND '{other}' (expected local or gotrue)"
                ));
            }
        };

        Ok(Config {
            database_url,
            host,
            port,
            log_level,
            identity,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
