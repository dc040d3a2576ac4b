use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "desk", version, about = "Helpdesk operator CLI")]
pub struct Cli {
    /// PostgreSQL connection URL.
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/desk"
    )]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Seed the default permission catalog and roles
    Seed {
        /// Also create an administrator with this email
        #[arg(long, requires = "admin_password")]
        admin_email: Option<String>,

        /// Password for the administrator
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: Option<String>,
    },

    /// Print the version
    Version,
}
