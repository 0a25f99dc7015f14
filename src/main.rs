use anyhow::Context;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tripwise::config::ConfigLoader;
use tripwise::observability::{gather, init_tracing};
use tripwise::services::{ChatSession, TurnOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _guard = init_tracing(&config.logging);

    ConfigLoader::validate(&config).context("invalid configuration")?;
    info!("Starting {} ({})", config.app_name, config.environment);

    let session = ChatSession::from_config(&config)
        .await
        .context("failed to initialise chat session")?;

    println!("Hybrid travel assistant. Type 'exit' or 'quit' to leave, 'clear' to reset history.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nEnter your travel question: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match session.handle(&line).await {
            Ok(TurnOutcome::Answered(answer)) => {
                println!("\n=== Assistant Answer ===\n{}\n=== End ===", answer.text);
            }
            Ok(TurnOutcome::Cleared) => println!("Conversation history cleared."),
            Ok(TurnOutcome::Exit) => break,
            Ok(TurnOutcome::Empty) => {}
            Err(e) => eprintln!("[{} failed] {}", e.stage(), e),
        }
    }

    debug!("Session metrics:\n{}", gather());
    info!("Shutting down");
    Ok(())
}
