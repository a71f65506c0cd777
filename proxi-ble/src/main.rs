//! Proxi user tool
//!
//! Runs the User side of the proximity game against the first BLE adapter,
//! and a few helpers around it.

use std::time::Duration;

use btleplug::api::{Central as _, Peripheral as _, ScanFilter};
use clap::{Parser, Subcommand};
use tracing::info;

use proxi_ble::central::{BtleCentral, candidate, get_adapter};
use proxi_client::{
    Client, ClientConfig, LedgerStore, ProximityClient, PointLedger, event_channel, proxi_home,
};
use proxi_proto::gatt::CLIENT_NAME;
use proxi_proto::{DEFAULT_ULTRA_CLOSE_POINTS, SignalSample, Verdict};

#[derive(Parser)]
#[command(name = "proxi")]
#[command(about = "User side of the proxi proximity game")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan, connect and report RSSI until interrupted
    Run {
        /// Beacon name to look for
        #[arg(long)]
        name: Option<String>,
        /// Minimum RSSI (exclusive) for connecting
        #[arg(long, allow_negative_numbers = true)]
        gate: Option<i16>,
        /// Milliseconds between RSSI reports (at least 1)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// List nearby BLE devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Show the saved point balance
    Balance,
    /// Set the saved point balance to zero
    ResetBalance,
    /// Show the verdict the beacon sends for a sample
    Classify {
        #[arg(allow_negative_numbers = true)]
        rssi: i32,
        /// Points attached to ultra close verdicts
        #[arg(long, allow_negative_numbers = true, default_value_t = DEFAULT_ULTRA_CLOSE_POINTS)]
        points: i32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    proxi_ble::logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            name,
            gate,
            interval_ms,
        } => {
            let home = proxi_home()?;
            let mut config = ClientConfig::load(&home)?;
            if let Some(name) = name {
                config.beacon_name = name;
            }
            if let Some(gate) = gate {
                config.proximity_gate = gate;
            }
            if let Some(interval_ms) = interval_ms {
                config.send_interval_ms = interval_ms;
            }
            config.validate()?;
            run(config, LedgerStore::in_home(&home)).await?;
        }
        Commands::Scan { duration } => {
            let home = proxi_home()?;
            scan_devices(ClientConfig::load(&home)?, duration).await?;
        }
        Commands::Balance => {
            let store = LedgerStore::in_home(&proxi_home()?);
            println!("{}", store.load()?);
        }
        Commands::ResetBalance => {
            let store = LedgerStore::in_home(&proxi_home()?);
            let mut ledger = PointLedger::with_balance(store.load()?);
            ledger.clear();
            store.save(ledger.balance())?;
            println!("Balance reset to 0");
        }
        Commands::Classify { rssi, points } => {
            let verdict = Verdict::for_sample(SignalSample::new(rssi), points);
            println!("{}", verdict.to_packet());
        }
    }

    Ok(())
}

async fn run(config: ClientConfig, store: LedgerStore) -> anyhow::Result<()> {
    info!(identity = CLIENT_NAME, "User booting...");
    let (tx, rx) = event_channel(config.event_capacity);
    let central = BtleCentral::new(tx).await?;

    let mut client = Client::new(central, rx, config, Some(store));
    client.run().await?;
    Ok(())
}

async fn scan_devices(config: ClientConfig, duration: u64) -> anyhow::Result<()> {
    println!("Scanning for {} ({} seconds)...", config.beacon_name, duration);

    let adapter = get_adapter().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration)).await;

    let peripherals = adapter.peripherals().await?;
    let gatekeeper = ProximityClient::new(&config, PointLedger::default());

    println!("\nFound {} devices:", peripherals.len());
    for peripheral in peripherals {
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        let found = candidate(&peripheral, props);
        let name = found.name.clone().unwrap_or_else(|| "Unknown".to_string());
        let rssi = found
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());

        let marker = if gatekeeper.accepts(&found) {
            " [BEACON, in range]"
        } else if found.name.as_deref() == Some(config.beacon_name.as_str()) {
            " [BEACON, too far]"
        } else {
            ""
        };

        println!("  {} ({}) RSSI: {}{}", name, found.address, rssi, marker);
    }

    adapter.stop_scan().await?;
    Ok(())
}
