//! API endpoints and credentials per environment

use anyhow::Context;
use depoline_core::Environment;

pub const SANDBOX_URL: &str = "https://sandbox.zenodo.org/api";
pub const PRODUCTION_URL: &str = "https://zenodo.org/api";

pub fn api_url(env: Environment) -> &'static str {
    match env {
        Environment::Sandbox => SANDBOX_URL,
        Environment::Production => PRODUCTION_URL,
    }
}

/// Read the token for `env`. Never falls back to the other environment.
pub fn load_token(env: Environment) -> anyhow::Result<String> {
    let var = env.token_var();
    let token = std::env::var(var)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .with_context(|| format!("{var} is not set (required for {env} uploads)"))?;
    Ok(token)
}
