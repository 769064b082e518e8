use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use perimeter::models::access_token;
use perimeter::store::default_expiry;
use perimeter::{
    CacheService, Config, NewAccessToken, PerimeterError, TokenLookup, TokenStore, db, logging,
    recorder,
};

#[derive(Parser)]
#[command(name = "perimeter")]
#[command(about = "Issue and manage perimeter access tokens")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending migrations
    Migrate,
    /// Issue a new access token
    Issue {
        /// Token value (generated when omitted)
        #[arg(long)]
        token: Option<String>,
        /// Days from today until the token expires
        #[arg(long, conflicts_with = "expires_on")]
        days: Option<i64>,
        /// Last valid day (YYYY-MM-DD)
        #[arg(long)]
        expires_on: Option<NaiveDate>,
        /// Who the token was issued by
        #[arg(long)]
        created_by: Option<String>,
        /// Issue the token switched off
        #[arg(long)]
        inactive: bool,
    },
    /// List all tokens, newest first
    List,
    /// Show one token
    Show { token: String },
    /// Switch a token on
    Activate { token: String },
    /// Switch a token off; sessions using it are locked on their next request
    Deactivate { token: String },
    /// Move a token's expiry date
    Extend {
        token: String,
        /// New last valid day (YYYY-MM-DD)
        #[arg(long)]
        expires_on: NaiveDate,
    },
    /// Delete a token and its usage history
    Delete { token: String },
    /// Show who has used a token
    Uses { token: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), PerimeterError> {
    let config = Config::from_env()?;
    logging::init_logging_with_level("warn");

    let conn = db::connect(&config).await?;
    let cache = open_cache(&config).await?;
    let store = TokenStore::new(conn, cache, &config);

    match cli.command {
        Commands::Migrate => {
            println!("Running pending migrations...");
            db::migrate(store.db()).await?;
            println!("Done.");
        }
        Commands::Issue {
            token,
            days,
            expires_on,
            created_by,
            inactive,
        } => {
            let expires_on = match (expires_on, days) {
                (Some(date), _) => Some(date),
                (None, Some(days)) => Some(default_expiry(days)?),
                (None, None) => None,
            };
            let issued = store
                .create_access_token(NewAccessToken {
                    token,
                    is_active: Some(!inactive),
                    expires_on,
                    created_by,
                })
                .await?;
            print_token(&issued);
        }
        Commands::List => {
            let tokens = store.list_access_tokens().await?;
            if tokens.is_empty() {
                println!("No access tokens.");
            }
            for token in &tokens {
                print_token(token);
            }
        }
        Commands::Show { token } => print_token(&lookup(&store, &token).await?),
        Commands::Activate { token } => print_token(&store.set_active(&token, true).await?),
        Commands::Deactivate { token } => print_token(&store.set_active(&token, false).await?),
        Commands::Extend { token, expires_on } => {
            print_token(&store.set_expires_on(&token, expires_on).await?)
        }
        Commands::Delete { token } => {
            if store.delete(&token).await? {
                println!("Deleted {}", token);
            } else {
                return Err(PerimeterError::NotFound(format!("access token {token}")));
            }
        }
        Commands::Uses { token } => {
            let found = lookup(&store, &token).await?;
            let uses = recorder::list_uses(store.db(), found.id).await?;
            println!("{} use(s) of {}", uses.len(), found.token);
            for usage in uses {
                println!(
                    "  {}  {} <{}>  {}  {}",
                    usage.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    usage.user_name,
                    usage.user_email,
                    usage.client_ip,
                    usage.client_user_agent
                );
            }
        }
    }

    Ok(())
}

#[cfg(feature = "redis")]
async fn open_cache(config: &Config) -> Result<CacheService, PerimeterError> {
    match &config.redis_url {
        Some(url) => Ok(CacheService::new(perimeter::cache::RedisCache::new(url).await?)),
        None => {
            warn_in_memory();
            Ok(CacheService::in_memory())
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn open_cache(config: &Config) -> Result<CacheService, PerimeterError> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but this build lacks the `redis` feature");
    }
    warn_in_memory();
    Ok(CacheService::in_memory())
}

fn warn_in_memory() {
    tracing::warn!(
        "using an in-process cache; running servers keep serving their cached copy until it expires"
    );
}

async fn lookup(store: &TokenStore, token: &str) -> Result<access_token::Model, PerimeterError> {
    match store.get_access_token(token).await? {
        TokenLookup::Found(model) => Ok(model),
        TokenLookup::Empty => Err(PerimeterError::NotFound(format!("access token {token}"))),
    }
}

fn print_token(token: &access_token::Model) {
    let status = if !token.is_active {
        "inactive"
    } else if token.has_expired() {
        "expired"
    } else {
        "valid"
    };
    println!(
        "{:<12} {:<8} expires {}  created {} by {}",
        token.token,
        status,
        token.expires_on,
        token.created_at.format("%Y-%m-%d"),
        token.created_by.as_deref().unwrap_or("-")
    );
}
