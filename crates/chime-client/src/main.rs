use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use chime_client::config::local_timezone;
use chime_client::{ChatClient, ClientConfig};

/// chime-client - send messages to a Chime server from the terminal
#[derive(Debug, Parser)]
#[command(name = "chime-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Client id to connect as (random when omitted)
    #[arg(long, env = "CHIME_CLIENT_ID")]
    client_id: Option<i64>,

    /// Timezone sent at bootstrap (the machine's zone when omitted)
    #[arg(long)]
    timezone: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chime_client=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let client_id = cli.client_id.unwrap_or_else(|| rand::random_range(1..=255));
    let timezone = cli.timezone.unwrap_or_else(local_timezone);

    let mut client = ChatClient::connect(&config, client_id).await?;
    let (chat_id, timezone) = client.bootstrap(&timezone).await?;
    info!("Chat {} ready in {}", chat_id, timezone);

    let (mut sender, mut events) = client.into_split();
    let reader = tokio::spawn(async move {
        while let Ok(event) = events.next_event().await {
            println!("Reply from server: {}", event.to_json());
        }
    });

    println!("Type a message, /voice <file or url>, /video <file or url>, or exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let result = if line == "exit" {
            break;
        } else if let Some(address) = line.strip_prefix("/voice ") {
            sender.send_voice(address.trim()).await.map(|_| ())
        } else if let Some(address) = line.strip_prefix("/video ") {
            sender.send_video(address.trim()).await.map(|_| ())
        } else {
            sender.send_text(line).await
        };
        if let Err(e) = result {
            error!("{}", e);
        }
    }

    sender.close().await?;
    reader.abort();
    Ok(())
}
