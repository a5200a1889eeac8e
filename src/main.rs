//! fluxrec: screen recorder with paced capture, webcam overlay and microphone capture.

mod app;
mod commands;
mod config;
mod logging;
mod platform;
mod recording;
mod setup;

#[tokio::main]
async fn main() {
    if let Err(e) = app::run().await {
        tracing::error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
