//! Group Membership Monitor — standalone binary.
//!
//! Tracks membership of chat groups whose display name matches the
//! target keyword, persisting member presence/absence over time.
//! Connects to a sidecar messaging bridge for transport; supports
//! `--pairing-code` to request pairing-code authentication instead of
//! QR-code authentication.

mod bridge;
mod config;
mod db;
mod keyword;
mod lanes;
mod monitored;
mod reconciler;
mod registrar;
mod router;
mod session;
mod status;
mod transport;

use router::LoopControl;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let use_pairing_code = std::env::args().skip(1).any(|a| a == "--pairing-code");
    let config = config::Config::from_env();

    session::ensure_session_dir(&config.session_dir).expect("Failed to create session directory");

    log::info!("Opening database at: {}", config.db_path);
    let database = Arc::new(db::Db::open(&config.db_path).expect("Failed to open database"));

    let monitored = Arc::new(monitored::MonitoredGroups::new());
    let loaded = monitored
        .load(&database)
        .expect("Failed to load monitored groups");
    log::info!("Loaded {} monitored group(s) from the store", loaded);

    let ctx = router::RouterContext {
        db: database,
        monitored,
        lanes: Arc::new(lanes::GroupLanes::new()),
        keyword: config::TARGET_KEYWORD.to_string(),
    };

    let auth = if use_pairing_code { "pairing-code" } else { "qr" };
    let mut attempt: u32 = 0;

    loop {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        match bridge::BridgeClient::connect(
            &config.bridge_addr,
            auth,
            config.mark_online_on_connect,
            events_tx,
        )
        .await
        {
            Ok(client) => {
                attempt = 0;
                log::info!("Connected to messaging bridge at {}", config.bridge_addr);

                let mut logged_out = false;
                while let Some(event) = events_rx.recv().await {
                    match router::handle_event(&ctx, client.as_ref(), event).await {
                        LoopControl::Continue => {}
                        LoopControl::Reconnect => break,
                        LoopControl::Logout => {
                            logged_out = true;
                            break;
                        }
                    }
                }

                if logged_out {
                    // Invalidated credentials must not survive to the next
                    // start; an external supervisor restarts the process.
                    match session::clear_session_dir(&config.session_dir) {
                        Ok(_) => log::error!("Logged out; session credentials cleared — restart required"),
                        Err(e) => log::error!("Logged out, but clearing session failed: {}", e),
                    }
                    std::process::exit(1);
                }
            }
            Err(e) => log::error!("Bridge connection failed: {}", e),
        }

        attempt += 1;
        if attempt > config.reconnect_max_attempts {
            log::error!(
                "Giving up after {} reconnect attempts",
                config.reconnect_max_attempts
            );
            std::process::exit(1);
        }

        let delay = config.reconnect_base_delay_secs * u64::from(attempt);
        log::warn!(
            "Connection closed; reconnecting in {}s (attempt {}/{})",
            delay,
            attempt,
            config.reconnect_max_attempts
        );
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }
}
