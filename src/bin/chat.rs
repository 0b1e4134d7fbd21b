//! Terminal client for the Chroma gateway
//!
//! Reads lines from stdin; plain lines are sent as messages, `/`-prefixed
//! lines are commands (`/help` lists them).

use chroma_chat::accounting::Accountant;
use chroma_chat::config::ClientConfig;
use chroma_chat::decoder::Emotion;
use chroma_chat::llm::GatewayClient;
use chroma_chat::session::{
    Author, Message, Session, SessionContext, SessionError, SessionHandle, SessionRuntime,
    SessionStatus,
};
use chroma_chat::settings::SqliteSettingsStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const CATALOG_WAIT: Duration = Duration::from_secs(10);

const HELP: &str = "\
Commands:
  /clear              start a new conversation
  /temp <0-2>         set the sampling temperature
  /system <prompt>    set the system prompt (empty clears it)
  /provider <id>      switch provider
  /model <id>         switch model (empty uses the provider default)
  /models             list providers and models offered by the gateway
  /delete <n>         delete message n (as numbered by /history)
  /history            show the conversation
  /quota              show today's remaining exchanges
  /quit               exit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chroma_chat=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;
    let settings = SqliteSettingsStore::open(&config.settings_path)?;
    let gateway = GatewayClient::new(&config.gateway_url, config.timeout)?;

    let context = SessionContext::new(Arc::new(Accountant::default()), config.locale);
    let (runtime, handle) = SessionRuntime::new(
        context,
        Session::default(),
        gateway.clone(),
        settings,
        gateway.clone(),
    );
    runtime.spawn();
    handle.load_settings().await?;

    let session = handle.snapshot();
    println!(
        "Connected to {} | provider {} | model {} | temperature {}",
        gateway.base_url(),
        session.config.provider,
        session.config.effective_model(),
        session.config.temperature,
    );
    println!("Type a message, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            if !run_command(command, &handle, &gateway).await? {
                break;
            }
            continue;
        }

        match handle.submit(line).await {
            Ok(()) => {}
            Err(SessionError::Rejected(e)) => {
                println!("! {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        let session = handle.wait_until_settled().await?;
        print_outcome(&session);
    }

    Ok(())
}

/// Returns false when the client should exit
async fn run_command(
    command: &str,
    handle: &SessionHandle,
    gateway: &GatewayClient,
) -> Result<bool, Box<dyn std::error::Error>> {
    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(n, a)| (n, a.trim()));

    match name {
        "quit" | "exit" => return Ok(false),
        "help" => println!("{HELP}"),
        "clear" => {
            handle.clear().await?;
            println!("Conversation cleared.");
        }
        "temp" => match arg.parse::<f64>() {
            Ok(value) => {
                handle.set_temperature(value).await?;
                println!("Temperature: {}", handle.snapshot().config.temperature);
            }
            Err(_) => println!("! expected a number between 0 and 2"),
        },
        "system" => {
            handle.set_system_prompt(arg).await?;
            println!("System prompt updated.");
        }
        "provider" => {
            handle.set_provider(arg).await?;
            let config = handle.snapshot().config;
            println!("Provider: {} (model {})", config.provider, config.effective_model());
        }
        "model" => {
            handle.set_model(arg).await?;
            println!("Model: {}", handle.snapshot().config.effective_model());
        }
        "models" => {
            handle.load_models().await?;
            let mut rx = handle.subscribe();
            let loaded = tokio::time::timeout(
                CATALOG_WAIT,
                rx.wait_for(|s| s.config.available_models.is_some()),
            )
            .await;
            if let Ok(Ok(session)) = loaded {
                if let Some(catalog) = &session.config.available_models {
                    println!("{}", serde_json::to_string_pretty(catalog)?);
                }
            } else {
                println!("! model catalog unavailable");
            }
        }
        "delete" => match arg.parse::<usize>() {
            Ok(n) if n > 0 => handle.delete_message_at(n - 1).await?,
            _ => println!("! expected a message number from /history"),
        },
        "history" => print_history(&handle.snapshot()),
        "quota" => match gateway.quota().await {
            Ok(quota) => println!(
                "{} of {} exchanges left today ({})",
                quota.status.remaining, quota.status.limit, quota.identity
            ),
            Err(e) => println!("! {}", e.message),
        },
        _ => println!("! unknown command /{name}; try /help"),
    }
    Ok(true)
}

fn print_outcome(session: &Session) {
    if let SessionStatus::Failed { failure } = &session.status {
        println!("! {}", failure.message);
    } else if let Some(reply) = session
        .conversation
        .last()
        .filter(|m| m.author == Author::Assistant)
    {
        print_reply(reply);
    }
}

fn print_reply(message: &Message) {
    let Some(decoded) = &message.decoded else {
        println!("{}", message.text);
        return;
    };
    let emotion = decoded.emotion.map_or("-", Emotion::as_str);
    match &decoded.topic {
        Some(topic) => println!("[{emotion}] {topic}"),
        None => println!("[{emotion}]"),
    }
    println!("{}", decoded.body);
    if let Some(usage) = &message.usage {
        println!(
            "  ({} tokens{}, {:.1}% of {} context)",
            usage.total_tokens,
            if usage.estimated { " est." } else { "" },
            usage.context_usage_percent,
            usage.max_context_tokens,
        );
    }
}

fn print_history(session: &Session) {
    if session.conversation.is_empty() {
        println!("(empty)");
        return;
    }
    for (i, message) in session.conversation.iter().enumerate() {
        let who = match message.author {
            Author::User => "you",
            Author::Assistant => "bot",
        };
        let text = message
            .decoded
            .as_ref()
            .map_or(message.text.as_str(), |d| d.body.as_str());
        println!("{:>3} {who}: {text}", i + 1);
    }
}
