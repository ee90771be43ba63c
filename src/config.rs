use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use s3_folders::{
    models::identity::{BucketConfig, BucketIdentity, Credentials},
    store::{
        ObjectStore,
        local::{LinkSettings, LocalStore},
        s3::S3Store,
    },
    timezone::DEFAULT_TIMEZONE,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{env, path::Path, str::FromStr, sync::Arc};

const ENV_PREFIX: &str = "S3_FOLDERS_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    S3,
    Local,
}

/// Centralized application configuration.
/// Combines `S3_FOLDERS_*` environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: Backend,
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub path_style: bool,
    pub local_root: String,
    pub database_url: String,
    pub link_base_url: String,
    pub link_secret: String,
    pub timezone: String,
    pub page_size: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Folder operations on an S3-compatible bucket")]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Default)]
pub struct GlobalArgs {
    /// Store backend (overrides S3_FOLDERS_BACKEND)
    #[arg(long, value_enum, global = true)]
    pub backend: Option<Backend>,

    /// Bucket name (overrides S3_FOLDERS_BUCKET)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Bucket region (overrides S3_FOLDERS_REGION)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Custom S3 endpoint (overrides S3_FOLDERS_ENDPOINT)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Access key id (overrides S3_FOLDERS_ACCESS_KEY)
    #[arg(long, global = true)]
    pub access_key: Option<String>,

    /// Secret access key (overrides S3_FOLDERS_SECRET_KEY)
    #[arg(long, global = true)]
    pub secret_key: Option<String>,

    /// Session token for temporary credentials (overrides S3_FOLDERS_SESSION_TOKEN)
    #[arg(long, global = true)]
    pub session_token: Option<String>,

    /// Use path-style addressing (overrides S3_FOLDERS_PATH_STYLE)
    #[arg(long, global = true)]
    pub path_style: bool,

    /// Payload directory of the local backend (overrides S3_FOLDERS_LOCAL_ROOT)
    #[arg(long, global = true)]
    pub local_root: Option<String>,

    /// Metadata database of the local backend (overrides S3_FOLDERS_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Base URL of local-backend links (overrides S3_FOLDERS_LINK_BASE_URL)
    #[arg(long, global = true)]
    pub link_base_url: Option<String>,

    /// Secret signing local-backend links (overrides S3_FOLDERS_LINK_SECRET)
    #[arg(long, global = true)]
    pub link_secret: Option<String>,

    /// IANA zone used for timestamps (overrides S3_FOLDERS_TIMEZONE)
    #[arg(long, global = true)]
    pub timezone: Option<String>,

    /// Keys requested per listing page (overrides S3_FOLDERS_PAGE_SIZE)
    #[arg(long, global = true)]
    pub page_size: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Verify the credentials and that the bucket is reachable
    Check,
    /// Show metadata of an object
    Stat { key: String },
    /// List objects under a folder (the whole bucket without a prefix)
    Ls {
        prefix: Option<String>,
        /// Only report whether the folder exists and has content
        #[arg(long)]
        probe: bool,
    },
    /// Upload a local file
    Put {
        path: String,
        /// Object key (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        /// Replace an existing object
        #[arg(long)]
        overwrite: bool,
    },
    /// Create a folder
    Mkdir {
        name: String,
        /// Rewrite the sentinel of an existing folder
        #[arg(long)]
        replace: bool,
    },
    /// Delete a file or an empty folder
    Rm { key: String },
    /// Delete everything inside a folder but keep the folder
    Empty { prefix: String },
    /// Delete a folder and everything inside it
    Purge { prefix: String },
    /// Move or rename a file
    Mv { old: String, new: String },
    /// Move or rename a folder with its contents
    Mvdir { old: String, new: String },
    /// Print a time-limited download link
    Link {
        key: String,
        /// Link lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        expires: u64,
    },
    /// Apply the local backend's metadata schema and exit
    Migrate,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig, the command and the JSON flag.
    pub fn from_env_and_args() -> Result<(Self, Command, bool)> {
        let args = Args::parse();
        let cfg = Self::merge(args.global, |name| env::var(name).ok())?;
        Ok((cfg, args.command, args.json))
    }

    /// CLI values win over the environment, the environment over defaults.
    fn merge(args: GlobalArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| env(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        let backend = match (args.backend, var("BACKEND")) {
            (Some(backend), _) => backend,
            (None, Some(value)) => <Backend as ValueEnum>::from_str(&value, true)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("parsing {ENV_PREFIX}BACKEND value `{value}`"))?,
            (None, None) => Backend::S3,
        };

        let path_style = args.path_style
            || match var("PATH_STYLE") {
                Some(value) => parse_flag(&value)
                    .with_context(|| format!("parsing {ENV_PREFIX}PATH_STYLE value `{value}`"))?,
                None => false,
            };

        let page_size = match (args.page_size, var("PAGE_SIZE")) {
            (Some(size), _) => size,
            (None, Some(value)) => value
                .parse::<usize>()
                .with_context(|| format!("parsing {ENV_PREFIX}PAGE_SIZE value `{value}`"))?,
            (None, None) => BucketConfig::default().page_size,
        };

        let Some(bucket) = args.bucket.or_else(|| var("BUCKET")) else {
            bail!("no bucket configured; pass --bucket or set {ENV_PREFIX}BUCKET");
        };

        Ok(Self {
            backend,
            bucket,
            region: args
                .region
                .or_else(|| var("REGION"))
                .unwrap_or_else(|| "ap-south-1".into()),
            endpoint: args.endpoint.or_else(|| var("ENDPOINT")),
            access_key: args.access_key.or_else(|| var("ACCESS_KEY")),
            secret_key: args.secret_key.or_else(|| var("SECRET_KEY")),
            session_token: args.session_token.or_else(|| var("SESSION_TOKEN")),
            path_style,
            local_root: args
                .local_root
                .or_else(|| var("LOCAL_ROOT"))
                .unwrap_or_else(|| "./data/objects".into()),
            database_url: args
                .database_url
                .or_else(|| var("DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/s3_folders.db".into()),
            link_base_url: args
                .link_base_url
                .or_else(|| var("LINK_BASE_URL"))
                .unwrap_or_else(|| "http://127.0.0.1:3000".into()),
            link_secret: args
                .link_secret
                .or_else(|| var("LINK_SECRET"))
                .unwrap_or_default(),
            timezone: args
                .timezone
                .or_else(|| var("TIMEZONE"))
                .unwrap_or_else(|| DEFAULT_TIMEZONE.into()),
            page_size,
        })
    }

    pub fn bucket_config(&self) -> BucketConfig {
        BucketConfig {
            page_size: self.page_size,
            timezone: self.timezone.clone(),
        }
    }

    /// Credentials and addressing for the S3 backend.
    pub fn identity(&self) -> Result<BucketIdentity> {
        let (Some(access_key), Some(secret_key)) = (&self.access_key, &self.secret_key) else {
            bail!(
                "S3 backend needs credentials; set {ENV_PREFIX}ACCESS_KEY and {ENV_PREFIX}SECRET_KEY"
            );
        };
        Ok(BucketIdentity {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            credentials: Credentials {
                access_key_id: access_key.clone(),
                secret_access_key: secret_key.clone(),
                session_token: self.session_token.clone(),
            },
            path_style: self.path_style,
        })
    }

    /// Build the connector selected by `backend`.
    pub async fn connect(&self) -> Result<Arc<dyn ObjectStore>> {
        match self.backend {
            Backend::S3 => {
                let store = S3Store::new(&self.identity()?)
                    .context("building the S3 client")?;
                Ok(Arc::new(store))
            }
            Backend::Local => {
                if self.link_secret.is_empty() {
                    bail!(
                        "local backend needs a link signing secret; set {ENV_PREFIX}LINK_SECRET or pass --link-secret"
                    );
                }
                let db = self.open_database().await?;
                LocalStore::migrate(&db)
                    .await
                    .context("applying the local metadata schema")?;
                let links = LinkSettings {
                    base_url: self.link_base_url.clone(),
                    secret: self.link_secret.clone(),
                };
                let store = LocalStore::open(
                    Arc::new(db),
                    &self.local_root,
                    &self.bucket,
                    &self.region,
                    links,
                )
                .await
                .with_context(|| format!("opening local bucket `{}`", self.bucket))?;
                Ok(Arc::new(store))
            }
        }
    }

    /// Connect to the local metadata database, creating the file and its
    /// directory when missing.
    pub async fn open_database(&self) -> Result<SqlitePool> {
        let db_url = &self.database_url;
        tracing::debug!("Connecting using raw URL => {}", db_url);

        let db_path = db_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory {}", parent.display()))?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("parsing database URL `{db_url}`"))?
            .create_if_missing(true);
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to `{db_url}`"))
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn environment_fills_unset_arguments() {
        let cfg = AppConfig::merge(
            GlobalArgs::default(),
            env_of(&[
                ("S3_FOLDERS_BUCKET", "media"),
                ("S3_FOLDERS_BACKEND", "LOCAL"),
                ("S3_FOLDERS_PAGE_SIZE", "250"),
                ("S3_FOLDERS_PATH_STYLE", "yes"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.bucket, "media");
        assert_eq!(cfg.backend, Backend::Local);
        assert_eq!(cfg.page_size, 250);
        assert!(cfg.path_style);
        assert_eq!(cfg.timezone, DEFAULT_TIMEZONE);
        assert_eq!(cfg.region, "ap-south-1");
    }

    #[test]
    fn arguments_override_environment() {
        let args = GlobalArgs {
            bucket: Some("cli-bucket".into()),
            backend: Some(Backend::S3),
            page_size: Some(10),
            ..GlobalArgs::default()
        };
        let cfg = AppConfig::merge(
            args,
            env_of(&[
                ("S3_FOLDERS_BUCKET", "env-bucket"),
                ("S3_FOLDERS_BACKEND", "local"),
                ("S3_FOLDERS_PAGE_SIZE", "not-a-number"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.bucket, "cli-bucket");
        assert_eq!(cfg.backend, Backend::S3);
        assert_eq!(cfg.page_size, 10);
    }

    #[test]
    fn bad_values_are_reported_with_their_variable() {
        let err = AppConfig::merge(
            GlobalArgs::default(),
            env_of(&[("S3_FOLDERS_BUCKET", "b"), ("S3_FOLDERS_PAGE_SIZE", "many")]),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("S3_FOLDERS_PAGE_SIZE"));

        let err = AppConfig::merge(GlobalArgs::default(), env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("no bucket configured"));
    }

    #[test]
    fn s3_identity_requires_both_keys() {
        let mut cfg = AppConfig::merge(
            GlobalArgs::default(),
            env_of(&[("S3_FOLDERS_BUCKET", "b"), ("S3_FOLDERS_ACCESS_KEY", "id")]),
        )
        .unwrap();
        assert!(cfg.identity().is_err());
        cfg.secret_key = Some("secret".into());
        let identity = cfg.identity().unwrap();
        assert_eq!(identity.credentials.access_key_id, "id");
        assert_eq!(identity.bucket, "b");
    }

    #[tokio::test]
    async fn local_backend_requires_link_secret() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("s3_folders.db");
        let cfg = AppConfig::merge(
            GlobalArgs {
                backend: Some(Backend::Local),
                bucket: Some("local-bucket".into()),
                local_root: Some(dir.path().join("objects").display().to_string()),
                database_url: Some(format!("sqlite://{}", db_path.display())),
                ..GlobalArgs::default()
            },
            env_of(&[("S3_FOLDERS_LINK_SECRET", "")]),
        )
        .unwrap();

        let err = cfg.connect().await.err().unwrap();
        assert!(err.to_string().contains("S3_FOLDERS_LINK_SECRET"));
        assert!(!db_path.exists());
    }

    #[tokio::test]
    async fn local_backend_creates_database_and_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("meta/nested/s3_folders.db");
        let cfg = AppConfig::merge(
            GlobalArgs {
                backend: Some(Backend::Local),
                bucket: Some("local-bucket".into()),
                local_root: Some(dir.path().join("objects").display().to_string()),
                database_url: Some(format!("sqlite://{}", db_path.display())),
                ..GlobalArgs::default()
            },
            env_of(&[("S3_FOLDERS_LINK_SECRET", "local-secret")]),
        )
        .unwrap();

        let store = cfg.connect().await.unwrap();
        assert_eq!(store.bucket_name(), "local-bucket");
        store.check_access().await.unwrap();
        assert!(db_path.exists());
    }
}
