mod commands;
#[cfg(feature = "mcp")]
mod mcp;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use bookworm::core::config::Config;
use commands::books::FlagChange;

#[derive(Parser)]
#[command(name = "bookworm")]
#[command(about = "Ask questions about your own library of documents", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Config file (default: ./bookworm.yaml)")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "More log output (-v, -vv)")]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the store
    Init {
        #[arg(long, help = "Overwrite an existing config file")]
        force: bool,
    },

    // ===== Library =====
    /// Ingest documents (files, directories or glob patterns)
    Add {
        #[arg(required = true)]
        paths: Vec<String>,
        #[arg(long, help = "Skip this many pages at the start")]
        start_page: Option<usize>,
        #[arg(long, help = "Stop before this page")]
        stop_page: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// List books
    Books {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// List the chunks of a book
    Chunks {
        book: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Remove a book and its chunks
    Remove { book: String },
    /// Remove one chunk
    #[command(name = "remove-chunk")]
    RemoveChunk { file_name: String, page_number: i64 },
    /// Leave a book out of retrieval
    Exclude { book: String },
    /// Put an excluded book back into retrieval
    Include { book: String },
    /// Mark a book for focused retrieval
    Focus { book: String },
    /// Clear the focus mark of a book
    Unfocus { book: String },
    /// Show the stored embedding of a chunk
    Vector {
        file_name: String,
        page_number: i64,
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    // ===== Retrieval =====
    /// Rank stored chunks against a query
    Search {
        query: String,
        #[arg(long, short = 'n', help = "Number of results")]
        limit: Option<usize>,
        #[arg(long, help = "Only focused books")]
        focus: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Answer a single question
    Ask {
        query: String,
        #[arg(long, help = "Only focused books")]
        focus: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Interactive session with conversation memory
    Chat {
        #[arg(long, help = "Only focused books")]
        focus: bool,
    },
    /// List the generation models on the model server
    Models {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show store statistics
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    // ===== MCP Server =====
    /// Start MCP server on stdio
    #[cfg(feature = "mcp")]
    Mcp {
        #[arg(long, help = "Show client configuration instructions")]
        install: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    bookworm::logging::init(cli.verbose);

    if let Commands::Init { force } = cli.command {
        return commands::init::run(cli.config.as_deref(), force);
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Init { .. } => Ok(()),

        // Library
        Commands::Add {
            paths,
            start_page,
            stop_page,
            json,
        } => commands::add::run(&config, &paths, start_page, stop_page, json),
        Commands::Books { json } => commands::books::list(&config, json),
        Commands::Chunks { book, json } => commands::books::chunks(&config, &book, json),
        Commands::Remove { book } => commands::books::remove(&config, &book),
        Commands::RemoveChunk {
            file_name,
            page_number,
        } => commands::books::remove_chunk(&config, &file_name, page_number),
        Commands::Exclude { book } => commands::books::set_flag(&config, &book, FlagChange::Exclude),
        Commands::Include { book } => commands::books::set_flag(&config, &book, FlagChange::Include),
        Commands::Focus { book } => commands::books::set_flag(&config, &book, FlagChange::Focus),
        Commands::Unfocus { book } => commands::books::set_flag(&config, &book, FlagChange::Unfocus),
        Commands::Vector {
            file_name,
            page_number,
            json,
        } => commands::books::vector(&config, &file_name, page_number, json),

        // Retrieval
        Commands::Search {
            query,
            limit,
            focus,
            json,
        } => commands::search::run(&config, &query, limit, focus, json),
        Commands::Ask { query, focus, json } => commands::ask::run(&config, &query, focus, json),
        Commands::Chat { focus } => commands::ask::chat(&config, focus),
        Commands::Models { json } => commands::models::run(&config, json),
        Commands::Status { json } => commands::status::run(&config, json),

        // MCP Server
        #[cfg(feature = "mcp")]
        Commands::Mcp { install } => {
            if install {
                print_mcp_install_instructions(&config);
                Ok(())
            } else {
                run_mcp_server(config)
            }
        }
    }
}

#[cfg(feature = "mcp")]
fn run_mcp_server(config: Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(mcp::run_mcp_server(config))
}

#[cfg(feature = "mcp")]
fn print_mcp_install_instructions(config: &Config) {
    let working_dir = std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "/path/to/your/library".to_string());

    let binary_path = std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "bookworm".to_string());

    println!("{}", "MCP Server Installation Guide".bold().cyan());
    println!();
    println!("Add the following to your MCP client configuration:");
    println!();
    println!(r#"{{
  "mcpServers": {{
    "bookworm": {{
      "command": "{}",
      "args": ["mcp"],
      "cwd": "{}"
    }}
  }}
}}"#, binary_path, working_dir);
    println!();
    println!("{} {}", "Store:".dimmed(), config.database.display());
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Liveness check", "rag_ping".green());
    println!("  • {} - Similarity search over stored chunks", "rag_search".green());
    println!("  • {} - Answer a question with retrieved context", "rag_query".green());
    println!("  • {} - Forget the conversation", "rag_clear_memory".green());
    println!("  • {} - List books", "rag_list_books".green());
    println!("  • {} - List the chunks of a book", "rag_list_chunks".green());
    println!("  • {} - Generation models on the model server", "rag_list_models".green());
    println!("  • {} - Library statistics", "rag_status".green());
}
