use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use gambit_core::ids::GameId;
use gambit_core::SessionContext;
use gambit_engine::{Credentials, GambitClient, HttpGameService};
use gambit_net::WsTransport;
use gambit_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "gambit", about = "Real-time chess client")]
struct Args {
    /// Server base URL, e.g. http://127.0.0.1:8000
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    server: String,

    #[arg(long)]
    username: String,

    #[arg(long)]
    password: String,

    /// Create the account instead of logging in.
    #[arg(long)]
    register: bool,

    /// Join this game's channel in addition to the lobby.
    #[arg(long)]
    game: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_telemetry(&TelemetryConfig {
        json_output: args.json_logs,
        ..TelemetryConfig::default()
    });

    tracing::info!(server = %args.server, "Starting gambit client");

    let credentials = Credentials {
        username: args.username.clone(),
        password: args.password.clone(),
    };
    let auth = if args.register {
        gambit_engine::register(&args.server, &credentials).await
    } else {
        gambit_engine::login(&args.server, &credentials).await
    }
    .expect("Authentication failed");
    tracing::info!(user = %auth.user, "Authenticated");

    let ctx = SessionContext::new(
        args.server.as_str(),
        ws_base(&args.server),
        auth.user,
        auth.token,
    );
    let service = Arc::new(HttpGameService::new(ctx.clone()));
    let client = GambitClient::new(ctx.clone(), service, Arc::new(WsTransport));

    client.bootstrap().await.expect("Initial fetch failed");
    let store = client.store();
    tracing::info!(
        games = store.sessions().len(),
        invitations = store.invitations().len(),
        online = store.online_users().len(),
        "State seeded"
    );

    client.join_lobby();
    if let Some(raw) = &args.game {
        client.join_game(GameId::from_raw(raw.clone()));
    }

    // Surface notifications until interrupted.
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for notification in store.drain_notifications() {
                    tracing::info!(?notification, "Notification");
                }
            }
        }
    }

    tracing::info!("Shutting down");
    client.close_all();
    if let Err(e) = gambit_engine::logout(&ctx).await {
        tracing::warn!(error = %e, "Logout failed");
    }
}

fn ws_base(server: &str) -> String {
    if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{server}")
    }
}
