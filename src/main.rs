use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crm_marketing::config::{
    AppConfig, FunnelMode, DEFAULT_SESSION_TTL_SECS, MAX_SESSION_TTL_SECS,
};
use crm_marketing::models::{CreateUserInput, Role};
use crm_marketing::{api, db, demo, events};

#[derive(Parser)]
#[command(name = "crm-marketing")]
#[command(about = "Customer segmentation, campaign simulation and marketing analytics")]
struct Cli {
    /// SQLite database file (defaults to the platform data directory)
    #[arg(long, global = true, env = "CRM_DATABASE_PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "5000", env = "CRM_PORT")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1", env = "CRM_HOST")]
        host: String,

        /// Publish lifecycle events to this Redis server
        #[arg(long, env = "REDIS_URL")]
        redis_url: Option<String>,

        /// Session lifetime in seconds (at most one year)
        #[arg(
            long,
            default_value_t = DEFAULT_SESSION_TTL_SECS,
            env = "CRM_SESSION_TTL_SECS",
            value_parser = clap::value_parser!(i64).range(1..=MAX_SESSION_TTL_SECS)
        )]
        session_ttl: i64,

        /// How launch funnels are simulated
        #[arg(long, value_enum, default_value_t = FunnelMode::Randomized, env = "CRM_FUNNEL_MODE")]
        funnel_mode: FunnelMode,

        /// Comma-separated allowed CORS origins (any origin when unset)
        #[arg(long, env = "CRM_CORS_ORIGINS")]
        cors_origins: Option<String>,
    },
    /// Load demo customers, segments and campaigns into an empty database
    Seed {
        #[arg(long, value_enum, default_value_t = FunnelMode::Randomized, env = "CRM_FUNNEL_MODE")]
        funnel_mode: FunnelMode,
    },
    /// Create an operator account
    CreateUser {
        username: String,

        #[arg(long, env = "CRM_USER_PASSWORD")]
        password: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long, value_parser = parse_role, default_value = "marketer")]
        role: Role,
    },
    /// Print events published on the Redis channel
    Listen {
        #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
        redis_url: String,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::from_str(s).ok_or_else(|| format!("unknown role '{}' (admin, marketer, analyst)", s))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "crm_marketing=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(path: Option<PathBuf>) -> anyhow::Result<db::Database> {
    let db = match path {
        Some(path) => db::Database::open(path)?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let command = cli.command.unwrap_or(Commands::Serve {
        port: 5000,
        host: "127.0.0.1".to_string(),
        redis_url: None,
        session_ttl: DEFAULT_SESSION_TTL_SECS,
        funnel_mode: FunnelMode::default(),
        cors_origins: None,
    });

    match command {
        Commands::Serve {
            port,
            host,
            redis_url,
            session_ttl,
            funnel_mode,
            cors_origins,
        } => {
            let db = open_database(cli.database)?;
            let purged = db.purge_expired_sessions(chrono::Utc::now())?;
            if purged > 0 {
                tracing::debug!("Purged {} expired sessions", purged);
            }

            let events = match redis_url {
                Some(url) => events::EventBus::with_redis(&url).await?,
                None => events::EventBus::new(),
            };

            let mut config = AppConfig::new(session_ttl, funnel_mode);
            if let Some(origins) = cors_origins {
                config = config.with_cors_origins(&origins);
            }

            let app = api::create_router(api::AppState::new(db, events, config));

            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("CRM marketing API listening on http://{}", addr);

            axum::serve(listener, app).await?;
        }
        Commands::Seed { funnel_mode } => {
            let db = open_database(cli.database)?;
            let summary = demo::initialize_demo_data(&db, &funnel_mode.simulator())?;
            if summary.initialized {
                println!(
                    "Seeded {} customers, {} segments and {} campaigns ({} launched)",
                    summary.customers, summary.segments, summary.campaigns, summary.launched
                );
                println!(
                    "Log in as {} / {}",
                    demo::DEMO_USERNAME,
                    demo::DEMO_PASSWORD
                );
            } else {
                println!("Database already has customers; nothing seeded");
            }
        }
        Commands::CreateUser {
            username,
            password,
            email,
            role,
        } => {
            let db = open_database(cli.database)?;
            let user = db.create_user(CreateUserInput {
                username,
                password,
                email,
                role: Some(role),
            })?;
            println!("Created {} user {} ({})", user.role.as_str(), user.username, user.id);
        }
        Commands::Listen { redis_url } => {
            events::listen(&redis_url).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_ttl(value: &str) -> Result<i64, clap::Error> {
        let cli = Cli::try_parse_from(["crm-marketing", "serve", "--session-ttl", value])?;
        match cli.command {
            Some(Commands::Serve { session_ttl, .. }) => Ok(session_ttl),
            _ => unreachable!("serve was requested"),
        }
    }

    #[test]
    fn session_ttl_must_be_within_a_year() {
        assert_eq!(session_ttl("3600").unwrap(), 3600);
        assert_eq!(session_ttl("31536000").unwrap(), MAX_SESSION_TTL_SECS);
        assert!(session_ttl("0").is_err());
        assert!(session_ttl("-1").is_err());
        assert!(session_ttl("31536001").is_err());
        assert!(session_ttl("9000000000000000").is_err());
    }
}
