//! Command line interface for the commons relay: serve the HTTP and WebSocket
//! endpoints, or mint capability tokens for a collective's members.

mod authz;
mod capability;
mod commons;
mod config;
mod connection;
mod distribution;
mod event;
mod filter;
mod grant;
mod message;
mod relay;
mod server;
mod ws;

use std::{fs, net::SocketAddr, path::Path};

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Settings;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "commons-relay",
    author,
    version,
    about = "Nostr relay with capability-gated commons"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Launch HTTP and WebSocket services.
    Serve,
    /// Sign a capability token and print it as JSON.
    Cap {
        /// Issuer secret key (hex).
        #[arg(long)]
        secret: String,
        /// Public key (hex) of the member receiving the grants.
        #[arg(long)]
        grantee: String,
        /// Commons reference or `39002:<owner>:*` prefix; defaults to any.
        #[arg(long)]
        commons: Option<String>,
        /// Unix time after which the token is rejected.
        #[arg(long)]
        expiry: Option<u64>,
        /// Grant as `<action>` or `<action>:<scope>`, e.g. `publish:kind:1`.
        #[arg(long = "grant")]
        grants: Vec<String>,
    },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve => {
            ensure_env_file(&cli.env)?;
            let cfg = Settings::from_env(&cli.env)?;
            let http_addr: SocketAddr = cfg.bind_http.parse().context("BIND_HTTP")?;
            let ws_addr: SocketAddr = cfg.bind_ws.parse().context("BIND_WS")?;
            let hub = ws::Hub::shared(relay::Relay::new(event::SchnorrVerifier));
            tokio::try_join!(
                server::serve_http(http_addr, cfg.relay_name.clone(), std::future::pending()),
                ws::serve_ws(ws_addr, hub, cfg.evict_interval, std::future::pending())
            )?;
        }
        Commands::Cap {
            secret,
            grantee,
            commons,
            expiry,
            grants,
        } => {
            let token = mint_cap(&secret, &grantee, commons.as_deref(), expiry, &grants)?;
            println!("{}", serde_json::to_string(&token)?);
        }
    }
    Ok(())
}

/// Build and sign a capability token.
fn mint_cap(
    secret: &str,
    grantee: &str,
    commons: Option<&str>,
    expiry: Option<u64>,
    grants: &[String],
) -> anyhow::Result<event::Event> {
    let sk = hex::decode(secret.trim()).context("secret key is not hex")?;
    let created_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    let tags = capability::token_tags(grantee, commons, expiry, grants);
    event::sign_event(&sk, capability::CAP_KIND, created_at, tags, "")
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::new();
    content.push_str("BIND_HTTP=127.0.0.1:7777\n");
    content.push_str("BIND_WS=127.0.0.1:7778\n");
    content.push_str(&format!(
        "EVICT_INTERVAL_MS={}\n",
        config::DEFAULT_EVICT_INTERVAL_MS
    ));
    content.push_str("RELAY_NAME=commons-relay\n");
    fs::write(env_path, content)?;
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::{grants_from_token, validate_auth},
        connection::Connection,
        event::{sign_event, SchnorrVerifier, Tag, Verifier, AUTH_KIND},
        grant::{Action, Grant},
    };
    use tempfile::TempDir;

    #[test]
    fn default_env_written_once() {
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("nested/.env");
        let path = env_path.to_str().unwrap();
        ensure_env_file(path).unwrap();
        let data = fs::read_to_string(&env_path).unwrap();
        assert!(data.contains("BIND_HTTP=127.0.0.1:7777"));
        assert!(data.contains("BIND_WS=127.0.0.1:7778"));
        assert!(data.contains("EVICT_INTERVAL_MS=3600000"));

        fs::write(&env_path, "BIND_HTTP=x\n").unwrap();
        ensure_env_file(path).unwrap();
        assert_eq!(fs::read_to_string(&env_path).unwrap(), "BIND_HTTP=x\n");
    }

    #[test]
    fn minted_cap_authenticates_grantee() {
        let issuer = hex::encode([1u8; 32]);
        let grantee_sk = [2u8; 32];
        let grantee = event::public_key_hex(&grantee_sk).unwrap();
        let token = mint_cap(
            &issuer,
            &grantee,
            Some("39002:owner:*"),
            None,
            &["publish:kind:1".into(), "access".into()],
        )
        .unwrap();
        assert!(SchnorrVerifier.verify(&token));
        assert_eq!(
            grants_from_token(&token),
            vec![
                Grant::new(Action::Publish, "kind:1", "39002:owner:*"),
                Grant::new(Action::Access, "*", "39002:owner:*"),
            ]
        );

        let auth = sign_event(
            &grantee_sk,
            AUTH_KIND,
            1,
            vec![
                Tag::new(&["challenge", "c"]),
                Tag(vec!["cap".into(), serde_json::to_string(&token).unwrap()]),
            ],
            "",
        )
        .unwrap();
        let conn = Connection {
            id: 1,
            challenge: "c".into(),
            identity: None,
            grants: vec![],
        };
        let ok = validate_auth(Some(&conn), &auth, &SchnorrVerifier, 1).unwrap();
        assert_eq!(ok.identity, grantee);
        assert_eq!(ok.grants.len(), 2);
    }

    #[tokio::test]
    async fn run_cap_prints_token() {
        let cli = Cli {
            env: "unused.env".into(),
            command: Commands::Cap {
                secret: hex::encode([1u8; 32]),
                grantee: "p".into(),
                commons: None,
                expiry: None,
                grants: vec!["access".into()],
            },
        };
        run(cli).await.unwrap();
        assert!(!Path::new("unused.env").exists());
    }

    #[test]
    fn mint_cap_rejects_bad_secret() {
        assert!(mint_cap("zz", "p", None, None, &[]).is_err());
        assert!(mint_cap("00", "p", None, None, &[]).is_err());
    }

    #[test]
    fn cli_parses_cap_flags() {
        let cli = Cli::try_parse_from([
            "commons-relay",
            "cap",
            "--secret",
            "01",
            "--grantee",
            "p",
            "--grant",
            "publish:kind:1",
            "--grant",
            "access",
            "--expiry",
            "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Cap {
                grants, expiry, ..
            } => {
                assert_eq!(grants, vec!["publish:kind:1", "access"]);
                assert_eq!(expiry, Some(10));
            }
            Commands::Serve => panic!("expected cap"),
        }
        assert_eq!(cli.env, ".env");
    }
}
