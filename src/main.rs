mod cli;

use actix_web::{App, HttpServer};
use knnreg::Workspace;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:7878";

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        let mut ws = Workspace::new();
        cli::run_repl(&mut ws);
    } else if args[1] == "serve" {
        let addr = args.get(2).map(String::as_str).unwrap_or(DEFAULT_ADDR);
        tracing::info!(%addr, "starting server");
        HttpServer::new(|| App::new().configure(knnreg::server::config))
            .bind(addr)?
            .run()
            .await?;
    } else {
        cli::run_single_command();
    }

    Ok(())
}
