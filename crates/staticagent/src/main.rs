#![forbid(unsafe_code)]

use clap::Parser;
use staticagent::config::{default_key_path, load_config, Cli, Commands, ReturnRouteArg};
use staticagent::keys::{load_or_generate_keypair, Keys};
use staticagent::message::ReturnRoute;
use staticagent::{Connection, Message, SendOptions};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };

    if let Some(ref path) = cli.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("failed to open log file {path:?}: {e}"))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}

/// Inline keys from config win over the key file.
fn resolve_keys(cli: &Cli, inline: Option<Keys>) -> anyhow::Result<Keys> {
    if let Some(keys) = inline {
        return Ok(keys);
    }
    let path = cli.key_file.clone().unwrap_or_else(default_key_path);
    debug!(path = %path.display(), "loading key file");
    load_or_generate_keypair(&path)
}

fn return_route(arg: ReturnRouteArg, msg: &Message) -> ReturnRoute {
    match arg {
        ReturnRouteArg::None => ReturnRoute::None,
        ReturnRouteArg::All => ReturnRoute::All,
        ReturnRouteArg::Thread => ReturnRoute::Thread(msg.id().to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli)?;

    match &cli.command {
        Commands::Keygen => {
            let keys = Keys::generate();
            println!("did:    {}", keys.did());
            println!("verkey: {}", keys.verkey_b58());
            println!("sigkey: {}", keys.sigkey_b58());
        }

        Commands::Identity => {
            let config = load_config(cli.config.as_deref())?;
            let keys = resolve_keys(&cli, config.keys()?)?;
            println!("did:    {}", keys.did());
            println!("verkey: {}", keys.verkey_b58());
        }

        Commands::Send {
            message,
            plaintext,
            anoncrypt,
            return_route: route_arg,
            await_reply,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(ref endpoint) = cli.endpoint {
                config.endpoint = Some(endpoint.clone());
            }
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

            let keys = resolve_keys(&cli, config.keys()?)?;
            let conn = Connection::builder()
                .keys(keys)
                .target(config.target()?)
                .transport(config.transport()?)
                .reply_timeout(config.reply_timeout())
                .build()?;
            info!(did = %conn.did(), "sending as");

            let msg = Message::from_value(serde_json::from_str(message)?)?;
            let mut opts = SendOptions::default();
            opts.plaintext = *plaintext;
            opts.anoncrypt = *anoncrypt;
            if let Some(arg) = route_arg {
                opts.return_route = Some(return_route(*arg, &msg));
            }

            if *await_reply {
                let reply = conn.send_and_await_reply(&msg, opts).await?;
                println!("{}", reply.pretty_print()?);
            } else {
                let reply = conn.queue(staticagent::operators::match_all());
                conn.send(&msg, &opts).await?;
                for returned in reply.get_all(|_| true) {
                    println!("{}", returned.pretty_print()?);
                }
                reply.close().await?;
            }
        }
    }

    Ok(())
}
