//! `stepvault init`: write the default configuration.

use anyhow::Context;
use stepvault_config::AppConfig;

pub fn run(force: bool) -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating {}", config_dir.display()))?;

    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or re-run with --force.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!("Created {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set GOOGLE_API_KEY (or api_key in the config)");
    println!("  2. Optionally set TAVILY_API_KEY for web search");
    println!("  3. Run: stepvault chat");
    Ok(())
}
