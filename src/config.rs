use crate::errors::{PricingError, PricingResult};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub static_dir: PathBuf,
    /// Upper bound on any requested lattice step count.
    pub max_lattice_steps: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 8080,
            static_dir: PathBuf::from("static"),
            max_lattice_steps: 5000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> PricingResult<Self> {
        dotenvy::dotenv().ok();

        let server_port = env_var_or("SERVER_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| PricingError::Config(format!("SERVER_PORT: {e}")))?;

        let max_lattice_steps = env_var_or("MAX_LATTICE_STEPS", "5000")
            .parse::<usize>()
            .map_err(|e| PricingError::Config(format!("MAX_LATTICE_STEPS: {e}")))?;

        if max_lattice_steps == 0 {
            return Err(PricingError::Config(
                "MAX_LATTICE_STEPS must be at least 1".into(),
            ));
        }

        Ok(Self {
            server_port,
            static_dir: PathBuf::from(env_var_or("STATIC_DIR", "static")),
            max_lattice_steps,
        })
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
