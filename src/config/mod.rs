// src/config/mod.rs
pub mod enricher;

pub use enricher::{
    api_key_env, EnricherConfig, PortConfig, PortsConfig, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH,
};
