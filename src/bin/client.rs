//! Interactive command-line client for MycoKV
//!
//! Reads protocol-style command lines (`get foo`, `put foo "bar"`) and
//! runs them through the typed client.

use clap::Parser;
use mycokv::protocol::parse_command;
use mycokv::value::decode_value;
use mycokv::{Client, ClientConfig, Command, Entry, Result};
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

/// MycoKV CLI
#[derive(Parser, Debug)]
#[command(name = "mycokv-cli")]
#[command(about = "Interactive client for the MycoKV key-value store")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 6922)]
    port: u16,

    /// Delay after connecting before the first command, in milliseconds
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,

    /// Give up on a response after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let config = ClientConfig {
        host: args.host,
        port: args.port,
        settle_delay: Duration::from_millis(args.settle_ms),
        response_timeout: args.timeout_ms.map(Duration::from_millis),
    };

    println!("Connecting to MycoKV at {}...", config.addr());
    let client = Client::connect_with(config).await?;
    println!("Connected! Type 'help' for available commands or 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_help();
            }
            _ => {
                if let Err(e) = handle_command(&client, input).await {
                    println!("Error: {}", e);
                }
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}

async fn handle_command(client: &Client, input: &str) -> Result<()> {
    match parse_command(input)? {
        Command::Get { key } => match client.get(&key).await? {
            Entry::Value(value) => println!("{}", serde_json::to_string(&value)?),
            Entry::Tree(tree) => println!("{}", serde_json::to_string_pretty(&tree)?),
            Entry::Raw(raw) => println!("{}", raw),
        },
        Command::Put { key, value } => {
            let echoed = client.put(&key, decode_value(&value)).await?;
            println!("{}", serde_json::to_string(&echoed)?);
        }
        Command::Delete { key } => {
            client.delete(&key).await?;
            println!("OK");
        }
        Command::Expire { key, ttl_ms } => {
            client.expire(&key, Duration::from_millis(ttl_ms)).await?;
            println!("OK");
        }
        Command::Purge => {
            client.purge().await?;
            println!("OK");
        }
    }

    Ok(())
}

fn print_help() {
    println!("Available commands:");
    println!("  get <key>            - Get a value, or a subtree with <key>.*[depth]");
    println!("  put <key> <value>    - Store a value (\"text\", 12, 1.5, true, null)");
    println!("  expire <key> <ms>    - Expire a key after <ms> milliseconds");
    println!("  delete <key>         - Delete a key");
    println!("  purge                - Delete every key");
    println!("  help                 - Show this help message");
    println!("  quit                 - Exit the client");
}
