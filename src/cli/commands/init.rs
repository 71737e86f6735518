//! Default config file creation

use std::path::Path;

use crate::config::Config;

pub fn cmd_init(path: Option<&Path>) -> anyhow::Result<()> {
    let path = path.map_or_else(Config::default_config_path, Path::to_path_buf);

    if Config::create_default_if_missing(&path)? {
        println!("Created default config at {}", path.display());
        println!("Set auth.jwt_secret before exposing the API.");
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}
