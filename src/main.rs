use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod catalog;
mod cli;
mod config;
mod events;
mod images;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use app::AppFactory;
use config::Config;
use semantic::MatchResponse;

fn init_logging() {
    // log:: macros are bridged into tracing by the subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(response: &MatchResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    let config = Config::load_with(&args.base_dir)?;

    match args.command {
        cli::Command::Serve { addr } => {
            let service = AppFactory::create_service(&config)?;
            log::info!(
                "serving {} products ({} dims), default k={}",
                service.products().len(),
                service.matrix().dimensions(),
                service.default_k()
            );
            let addr = addr.unwrap_or_else(|| config.listen_addr.clone());
            web::start_daemon(service, &addr, config.max_upload_bytes)
        }

        cli::Command::Image { path, k } => {
            let service = AppFactory::create_service(&config)?;
            let data = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path.file_name().and_then(|name| name.to_str());

            let response = service.match_image(&data, filename, k)?;
            print_json(&response)
        }

        cli::Command::Text { text, k } => {
            let service = AppFactory::create_service(&config)?;
            let response = service.match_text(&text, k)?;
            print_json(&response)
        }

        cli::Command::Demo { text } => {
            let service = AppFactory::create_service(&config)?;

            // products are non-empty once the service is built
            let first = &service.products()[0];
            let data = images::load_file(&first.image_file)?;
            let response = service.match_image(&data, Some("self"), None)?;
            println!(
                "Top-1 image match: {} | score: {}",
                response.top1.product.name, response.top1.score
            );

            let response = service.match_text(&text, None)?;
            println!(
                "Top-1 text match: {} | score: {}",
                response.top1.product.name, response.top1.score
            );
            Ok(())
        }
    }
}
