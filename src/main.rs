//! `chatbridge` command-line front end.
//!
//! ```text
//! chatbridge [--stream] [--model MODEL] [--config FILE] <prompt...>
//! chatbridge --probe
//! ```
//!
//! Endpoints come from `chatbridge.yaml` or `CHATBRIDGE_*` environment
//! variables. Transport failures print `Error: <message>` and exit with 1.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;

use chatbridge::inference::config::load_or_env;
use chatbridge::{ChatClient, ChatError};

/// Send one prompt to a local Ollama server or an OpenAI-compatible API.
#[derive(Parser, Debug)]
#[command(name = "chatbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print the reply chunk by chunk as it arrives
    #[arg(long)]
    stream: bool,

    /// Report connectivity of each configured backend and exit
    #[arg(long, conflicts_with = "stream")]
    probe: bool,

    /// Model name (defaults to `default_model` from the settings)
    #[arg(short = 'm', long, env = "CHATBRIDGE_MODEL", value_name = "MODEL")]
    model: Option<String>,

    /// Settings file path
    #[arg(short = 'c', long, env = "CHATBRIDGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Prompt text; words are joined with single spaces
    #[arg(required_unless_present = "probe", value_name = "PROMPT")]
    prompt: Vec<String>,
}

impl Cli {
    fn prompt(&self) -> String {
        self.prompt.join(" ")
    }
}

/// Print the user-facing error line and exit with status 1.
fn fail(err: &ChatError) -> ! {
    eprintln!("{}", err.display_for_user());
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    chatbridge::init_tracing();

    let cwd = std::env::current_dir().context("cannot read current directory")?;
    let (settings, config_path) = load_or_env(cli.config.as_deref(), &cwd)?;
    tracing::info!(config = ?config_path, "settings loaded");

    let client = ChatClient::from_settings(&settings)?;

    if cli.probe {
        for line in client.probe().await {
            println!("{line}");
        }
        return Ok(());
    }

    let prompt = cli.prompt();

    if !cli.stream {
        let reply = match &cli.model {
            Some(model) => client.send(&prompt, model).await,
            None => client.send_default(&prompt).await,
        };
        match reply {
            Ok(text) => println!("{text}"),
            Err(e) => fail(&e),
        }
        return Ok(());
    }

    let model = cli.model.as_deref().unwrap_or(client.default_model());
    let mut stream = match client.send_streaming(&prompt, model).await {
        Ok(stream) => stream,
        Err(e) => fail(&e),
    };

    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            Err(e) => {
                writeln!(stdout)?;
                fail(&e);
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}
