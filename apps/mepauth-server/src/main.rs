//! mepauth server - HMAC-authenticated token issuance.
//!
//! Verifies `SDK-HMAC-SHA256` signed token requests and answers with RS256
//! bearer tokens.
//!
//! # Usage
//!
//! ```text
//! KEY_COMPONENT=... JWT_KEY_PASSWORD=... mepauth-server
//! mepauth-server --health-check
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:8080` | Bind address |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `LOG_FORMAT` | *(text)* | `json` for JSON log lines |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//! | `KEY_DIR` | `/usr/mep/keys` | Root/work key material |
//! | `KEY_COMPONENT` | *(required)* | Operator key component, at least 256 bytes |
//! | `JWT_PRIVATE_KEY_FILE` | `/usr/mep/ssl/jwt_encrypted_privatekey` | Token signing key (PEM) |
//! | `JWT_KEY_PASSWORD` | *(unset)* | Signing key password, sealed into `KEY_DIR` |
//! | `JWT_KEY_ID` | `mepauth` | Token `kid` and issuer |
//! | `TOKEN_TTL_SECS` | `3600` | Token lifetime |
//! | `VALIDATION_WINDOW_SECS` | `300` | Failure tracking window |
//! | `BLOCK_WINDOW_SECS` | `900` | Block-list window |
//! | `BLOCK_THRESHOLD` | `3` | Failures before block-listing |
//! | `PERSISTENCE` | `false` | Persist access keys to `DATA_DIR` |
//! | `DATA_DIR` | `/usr/mep/data` | Access-key snapshot directory |
//! | `APP_INST_ID` / `ACCESS_KEY` / `SECRET_KEY` | *(unset)* | Credentials provisioned at startup |

mod bootstrap;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use mepauth_core::MepAuthConfig;
use mepauth_http::MepAuthHttpService;
use mepauth_token_core::{CredentialService, TokenIssuer};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::StartupSecrets;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

/// Perform a health check by connecting to the server and requesting `/health`.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if is_healthy_response(&response) {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

fn is_healthy_response(response: &str) -> bool {
    response.starts_with("HTTP/1.1 200") && response.contains("\"running\"")
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = MepAuthConfig::from_env()?;

    // Handle --health-check flag for container HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level, config.log_json)?;

    let secrets = StartupSecrets::from_env();
    let keys = bootstrap::init_key_hierarchy(&config, secrets.key_component)?;
    let signer = bootstrap::load_token_signer(&config, &keys, secrets.jwt_key_password)?;

    let store = bootstrap::build_store(&config)?;
    let credentials = CredentialService::new(store, keys);
    bootstrap::provision_initial(&credentials, secrets.initial_credential)?;

    let issuer = Arc::new(TokenIssuer::new(
        Arc::new(credentials),
        signer,
        bootstrap::tracker_config(&config),
    ));
    let service = MepAuthHttpService::new(Arc::clone(&issuer));

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, version = VERSION, "starting mepauth server");

    mepauth_http::serve(listener, service, async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    })
    .await;

    issuer.tracker().shutdown();
    Ok(())
}
