//! Init command - write a default config and create the store

use anyhow::Result;
use colored::*;
use std::fs;
use std::path::Path;

use bookworm::core::config::{Config, CONFIG_FILE};

pub fn run(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = config_path.unwrap_or_else(|| Path::new(CONFIG_FILE));

    let config = if path.exists() && !force {
        println!(
            "{} {} already exists (use {} to overwrite)",
            "!".yellow().bold(),
            path.display(),
            "--force".cyan()
        );
        Config::load(Some(path))?
    } else {
        let config = Config::default();
        fs::write(path, config.to_yaml()?)?;
        println!("{} Wrote {}", "✓".green(), path.display());
        config
    };

    let store = super::open_store(&config)?;
    let stats = store.stats()?;
    println!(
        "{} Store ready at {} ({} books)",
        "✓".green(),
        config.database.display(),
        stats.book_count
    );

    println!();
    println!("{}", "Endpoints".bold());
    println!("  {} embedding:  {} ({})", "→".dimmed(), config.embedding.url, config.embedding.model.cyan());
    println!("  {} generation: {} ({})", "→".dimmed(), config.generation.url, config.generation.model.cyan());

    Ok(())
}
