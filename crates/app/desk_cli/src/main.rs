// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use desk_core::store::postgres::PgStore;
use sqlx::postgres::PgPoolOptions;

mod cli;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn connect(database_url: &str) -> Result<sqlx::PgPool> {
    log::debug!("connecting to database");
    Ok(PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await?)
}

async fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    match &args.command {
        Commands::Migrate => {
            let pool = connect(&args.database_url).await?;
            desk_core::migrate::migrate(&pool).await?;
            log::info!("migrations applied");
        }
        Commands::Seed {
            admin_email,
            admin_password,
        } => {
            let pool = connect(&args.database_url).await?;
            let store = PgStore::new(pool);
            let report = desk_core::rbac::seed::seed_rbac(&store).await?;
            log::info!(
                "seeded {} permissions and {} roles",
                report.permissions_created,
                report.roles_created
            );

            if let Some(email) = admin_email {
                let password = admin_password
                    .as_deref()
                    .ok_or_else(|| Error::Custom("--admin-password is required".into()))?;
                if desk_core::rbac::seed::seed_admin(&store, email, password).await? {
                    log::info!("administrator {email} created");
                } else {
                    log::info!("administrator {email} already exists");
                }
            }
        }
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), desk_core::version());
        }
    }

    Ok(())
}
