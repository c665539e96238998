//! Models command - list what the generation server offers

use anyhow::Result;
use colored::Colorize;

use bookworm::chat::Generator;
use bookworm::core::config::Config;

pub fn run(config: &Config, json: bool) -> Result<()> {
    let generator = super::generator(config)?;
    let runtime = super::runtime()?;

    let models = match runtime.block_on(generator.list_models(&config.embedding.model)) {
        Ok(models) => models,
        Err(e) => {
            if json {
                println!("{}", serde_json::json!({ "error": e.to_string() }));
            } else {
                eprintln!("{} Failed to retrieve models. {}", "Error:".red().bold(), e);
            }
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        println!("{} No generation models available", "→".dimmed());
        return Ok(());
    }

    println!("{}", "Models".bold());
    println!();
    for model in &models {
        let marker = if *model == config.generation.model {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!("  {} {}", marker, model.cyan());
    }

    Ok(())
}
