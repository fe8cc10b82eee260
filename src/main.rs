use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod app;
mod backend;
mod config;
mod handler;
mod tui;
mod ui;

use app::App;
use backend::ChatClient;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui) -> Result<()> {
    let mut events = tui::EventHandler::new();
    let mut app = App::new(ChatClient::new(), events.sender());

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event)?,
            None => break,
        }
    }

    Ok(())
}

/// The terminal is owned by the TUI, so diagnostics go to a log file under
/// the user cache dir. Filtering follows RUST_LOG, defaulting to info.
fn init_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("chat-cli");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("could not create log directory {}", log_dir.display()))?;

    let log_file = std::fs::File::create(log_dir.join("chat.log"))
        .context("could not create log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}
