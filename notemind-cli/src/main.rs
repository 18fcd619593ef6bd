use std::io::{self, BufRead, Write};

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use notemind_cli::{ApiClient, Flow, Session};
use notemind_core::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    notemind_core::load_dotenv();
    let settings = Settings::load()?;

    // Logs go to stderr so they do not interleave with chat output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let gateway_url = settings.gateway_url();
    let api = ApiClient::new(&gateway_url)?;
    info!("Using gateway at {}", api.base_url());

    print_banner(api.base_url().as_str());
    let mut session = Session::new(api, settings.chat.default_context_limit_tokens);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", session.prompt_label());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        match session.handle(&line?).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => {
                warn!("Command failed: {}", e);
                println!("Error: {}", e);
            }
        }
    }

    println!("Bye.");
    Ok(())
}

fn print_banner(gateway_url: &str) {
    println!("\n╔════════════════════════════════════╗");
    println!("║           NoteMind CLI             ║");
    println!("╠════════════════════════════════════╣");
    println!("║  /register or /login to begin      ║");
    println!("║  /help lists every command         ║");
    println!("╚════════════════════════════════════╝");
    println!("Gateway: {}\n", gateway_url);
}
