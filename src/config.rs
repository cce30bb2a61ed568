use std::env;

use crate::Error;

const DEFAULT_TRAINER_ROLES: &str = "trainer,moderator";
const DEFAULT_CATEGORY: &str = "submissions";
const DEFAULT_API_ADDR: &str = "0.0.0.0:8000";

/// Runtime configuration, read once at startup. The store secrets and the
/// bot token are required; everything else has a sensible default.
#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    /// Base URL of the hosted store, without a trailing slash.
    pub supabase_url: String,
    pub supabase_key: String,
    /// When set, commands are registered in this guild only.
    pub guild_id: Option<u64>,
    /// Role names whose holders count as trainers.
    pub trainer_roles: Vec<String>,
    /// Name of the private category that collects submission threads.
    pub category_name: String,
    /// Bind address for the read-only query service.
    pub api_addr: String,
}

impl Config {
    /// Read configuration from the environment (after `dotenv` has had its
    /// say). Missing required variables are a fatal startup error.
    pub fn from_env() -> Result<Self, Error> {
        let required = |name: &str| -> Result<String, Error> {
            env::var(name)
                .map_err(|_| format!("Expected '{}=<value>' in the environment or .env", name).into())
        };

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            supabase_url: required("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            supabase_key: required("SUPABASE_KEY")?,
            guild_id: env::var("GUILD_ID")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| "GUILD_ID must be a numeric Discord guild id")?,
            trainer_roles: env::var("TRAINER_ROLES")
                .unwrap_or_else(|_| DEFAULT_TRAINER_ROLES.into())
                .split(',')
                .map(|r| r.trim().to_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
            category_name: env::var("SUBMISSIONS_CATEGORY")
                .unwrap_or_else(|_| DEFAULT_CATEGORY.into()),
            api_addr: env::var("API_ADDR").unwrap_or_else(|_| DEFAULT_API_ADDR.into()),
        })
    }
}
