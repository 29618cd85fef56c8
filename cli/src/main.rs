//! NeuroFleetX ride tracker CLI
//!
//! Headless client for the ride lifecycle: restores the persisted booking,
//! follows it over the live channel and prints every change as JSON.
//!
//! ```sh
//! # Save a session obtained from the dashboard login
//! ride-tracker login --token eyJ... --user-id 7
//!
//! # Follow the active ride until Ctrl+C
//! ride-tracker watch
//!
//! # Book and follow
//! ride-tracker book --origin "MG Road" --destination Hebbal --vehicle-type SEDAN
//!
//! # Cancel the active ride
//! ride-tracker cancel
//!
//! # Catch up over REST after a broker outage
//! ride-tracker refresh
//!
//! # Validate config without starting
//! ride-tracker --check
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use neurofleet_ride::application::SessionStore;
use neurofleet_ride::config::AppConfig;
use neurofleet_ride::domain::{BookingRequest, RouteChoice, UserProfile, UserRole};
use neurofleet_ride::infrastructure::{FileKeyValueStore, KvSessionStore};
use neurofleet_ride::tracker::{init_tracing, TrackerHandle, TrackerOptions};

/// NeuroFleetX ride tracker.
#[derive(Parser, Debug)]
#[command(
    name = "ride-tracker",
    version,
    about = "Follow a NeuroFleetX ride from the terminal",
    long_about = "NeuroFleetX ride tracker: restores the active booking, follows it over \
                  REST and the STOMP push channel and prints every state change.\n\n\
                  Default config: ~/.config/neurofleet/ride-tracker.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "RIDE_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit.
    #[arg(long)]
    check: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore the active ride and follow live updates until Ctrl+C.
    Watch,

    /// Book a ride and follow it until Ctrl+C.
    Book {
        #[arg(long)]
        origin: String,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        vehicle_type: String,
        /// Route flavour shown while tracking.
        #[arg(long, default_value = "fastest")]
        route: String,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        distance: Option<String>,
        #[arg(long)]
        estimated_time: Option<String>,
    },

    /// Cancel the active ride on the server and locally.
    Cancel,

    /// Print the reconciled ride state as JSON.
    Status,

    /// Re-fetch the active ride and reopen its live subscription.
    Refresh,

    /// Store an auth token and user identity.
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },

    /// Forget the stored session.
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(neurofleet_ride::default_config_path);

    let mut config = if config_path.exists() {
        match AppConfig::load(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                if cli.check {
                    std::process::exit(1);
                }
                eprintln!("Using default configuration.");
                AppConfig::default()
            }
        }
    } else {
        AppConfig::default()
    };

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_tracing(&config);
    info!(path = %config_path.display(), exists = config_path.exists(), "Configuration resolved");

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        println!("Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   API         : {}", config.api.base_url);
        println!("   Broker      : {}", config.channel.ws_url);
        println!("   Storage     : {}", config.storage.path.display());
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    match cli.command.unwrap_or(Command::Watch) {
        Command::Login {
            token,
            user_id,
            name,
            email,
        } => {
            let user = UserProfile {
                id: user_id,
                name,
                email,
                role: UserRole::Customer,
            };
            session(&config).save_auth(&token, &user)?;
            println!("Session saved for user {user_id}");
        }
        Command::Logout => {
            session(&config).clear_auth();
            println!("Session cleared");
        }
        Command::Status => {
            let handle = start(config).await?;
            let state = handle.state().await?;
            let output = serde_json::json!({
                "state": state,
                "flags": state.flags(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            handle.shutdown().await;
        }
        Command::Refresh => {
            let handle = start(config).await?;
            let state = handle.rides.resync().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            handle.shutdown().await;
        }
        Command::Cancel => {
            let handle = start(config).await?;
            if handle.cancel_ride().await? {
                println!("Ride cancelled");
            } else {
                println!("No active ride");
            }
            handle.shutdown().await;
        }
        Command::Watch => {
            let handle = start(config).await?;
            follow(handle).await;
        }
        Command::Book {
            origin,
            destination,
            vehicle_type,
            route,
            price,
            distance,
            estimated_time,
        } => {
            let handle = start(config).await?;
            let route = RouteChoice {
                distance: distance.clone(),
                estimated_time,
                price,
                ..RouteChoice::new(route)
            };
            let request = BookingRequest {
                price,
                distance,
                ..BookingRequest::new(origin, destination, vehicle_type)
            };

            match handle.rides.book_ride(route, request).await {
                Ok(state) => {
                    println!("{}", serde_json::to_string(&state)?);
                    follow(handle).await;
                }
                Err(e) => {
                    error!(error = %e, "Booking failed");
                    handle.shutdown().await;
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

fn session(config: &AppConfig) -> KvSessionStore {
    KvSessionStore::new(Arc::new(FileKeyValueStore::open(&config.storage.path)))
}

async fn start(config: AppConfig) -> Result<TrackerHandle, Box<dyn std::error::Error>> {
    Ok(TrackerHandle::start(TrackerOptions {
        config,
        restore: true,
    })
    .await?)
}

/// Print every event as a JSON line until Ctrl+C.
async fn follow(handle: TrackerHandle) {
    handle.install_signal_handler();
    let shutdown = handle.shutdown_signal();
    let mut events = handle.rides.subscribe_events();

    if let Ok(state) = handle.state().await {
        if let Ok(line) = serde_json::to_string(&state) {
            println!("{line}");
        }
    }
    info!("Following ride updates. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => error!(error = %e, "Failed to encode event"),
                },
                None => break,
            },
            _ = shutdown.wait() => break,
        }
    }

    handle.wait().await;
}
