use crate::store::S3Settings;
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr};

/// Default cap on a request body (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 << 20;

/// Extensions accepted when `ALLOWED_EXTENSIONS` is not set.
pub const DEFAULT_ALLOWED_EXTENSIONS: &str = ".png,.jpg,.jpeg,.gif,.webp";

const DEFAULT_PORT: u16 = 8080;

/// Which object store the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// The S3-compatible provider.
    S3,
    /// In-process store; contents vanish on restart. Development only.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown store backend `{}` (expected `s3` or `memory`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: StoreBackend,
    pub s3: S3Settings,
    pub jwt_key: Option<String>,
    pub max_upload_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("s3", &self.s3)
            .field("jwt_key", &self.jwt_key.as_ref().map(|_| "[hidden]"))
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("allowed_extensions", &self.allowed_extensions)
            .finish()
    }
}

/// What the process should do after configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve,
    /// Print a signed access token and exit.
    IssueToken { user_id: i64, ttl_minutes: i64 },
}

/// Command-line + environment configuration.
///
/// Credentials are read from the environment only.
#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP gateway for entity photo folders in S3")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides SERV_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket holding the photos (overrides BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Object store backend (overrides STORE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StoreBackend>,

    /// Maximum request body size in bytes (overrides MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Comma-separated extension allow-list, e.g. ".png,.jpg" (overrides ALLOWED_EXTENSIONS).
    /// An empty value disables the check.
    #[arg(long)]
    pub allowed_extensions: Option<String>,

    /// Issue an access token for this user id and exit
    #[arg(long, value_name = "USER_ID")]
    pub issue_token: Option<i64>,

    /// Lifetime of tokens issued with --issue-token
    #[arg(long, default_value_t = 60)]
    pub token_ttl_minutes: i64,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed CLI args over values from `lookup` (the environment).
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, Mode)> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match args.port {
            Some(port) => port,
            None => match non_empty("SERV_PORT") {
                Some(value) => value
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("parsing SERV_PORT value `{}`", value))?,
                None => DEFAULT_PORT,
            },
        };

        let max_upload_bytes = match args.max_upload_bytes {
            Some(bytes) => bytes,
            None => match non_empty("MAX_UPLOAD_BYTES") {
                Some(value) => value
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("parsing MAX_UPLOAD_BYTES value `{}`", value))?,
                None => DEFAULT_MAX_UPLOAD_BYTES,
            },
        };

        let backend = match args.backend {
            Some(backend) => backend,
            None => match non_empty("STORE_BACKEND") {
                Some(value) => value.parse().context("reading STORE_BACKEND")?,
                None => StoreBackend::S3,
            },
        };

        let allowed_extensions = parse_extensions(
            &args
                .allowed_extensions
                .or_else(|| lookup("ALLOWED_EXTENSIONS"))
                .unwrap_or_else(|| DEFAULT_ALLOWED_EXTENSIONS.into()),
        );

        let bucket = args.bucket.or_else(|| non_empty("BUCKET_NAME"));
        let access_key = non_empty("S3_ACCESS_KEY");
        let secret_key = non_empty("S3_SECRET_ACCESS_KEY");
        let jwt_key = non_empty("JWT_KEY");

        let mode = match args.issue_token {
            Some(user_id) => {
                if jwt_key.is_none() {
                    bail!("JWT_KEY must be set to issue tokens");
                }
                if args.token_ttl_minutes <= 0 {
                    bail!("--token-ttl-minutes must be positive");
                }
                Mode::IssueToken {
                    user_id,
                    ttl_minutes: args.token_ttl_minutes,
                }
            }
            None => Mode::Serve,
        };

        if mode == Mode::Serve
            && backend == StoreBackend::S3
            && (bucket.is_none() || access_key.is_none() || secret_key.is_none())
        {
            bail!("S3 credentials or bucket name are not provided");
        }

        let cfg = Self {
            host: args
                .host
                .or_else(|| non_empty("GATEWAY_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port,
            backend,
            s3: S3Settings::new(
                bucket.unwrap_or_else(|| "local".into()),
                access_key.unwrap_or_default(),
                secret_key.unwrap_or_default(),
            ),
            jwt_key,
            max_upload_bytes,
            allowed_extensions,
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Split a comma-separated list into lower-cased extensions with a leading dot.
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}
