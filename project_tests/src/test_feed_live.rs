use clap::Parser;
use lib_transit::feed::{Session, SessionConfig};
use lib_transit::preferences::MemoryStore;
use lib_transit::retrieve::{BootstrapClient, BootstrapConfig};
use lib_transit::{BoardState, BoardView, CatalogStatus, LiveStore, PreferenceStore, Preferences, RouteTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Prints the live board from the real feed", long_about = None)]
struct Args {
    /// Report interval in seconds
    #[clap(short, long, default_value_t = 15)]
    interval_seconds: u64,

    /// Street to display
    #[clap(short, long, default_value = "Талнахская")]
    street: String,

    /// Number of reports before exiting
    #[clap(short, long, default_value_t = 4)]
    reports: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let client = BootstrapClient::new(BootstrapConfig::default())?;
    let bootstrap = client.run().await?;
    println!(
        "Bootstrapped: {} stops, {} lines",
        bootstrap.catalog.stops.len(),
        bootstrap.catalog.vehicles.len()
    );

    let catalog = Arc::new(bootstrap.catalog);
    let live = LiveStore::new();
    let board = BoardState::new(
        RouteTable::builtin(),
        live.clone(),
        PreferenceStore::new(Arc::new(MemoryStore::new())),
    );
    board.set_catalog(CatalogStatus::Ready(Arc::clone(&catalog)));

    let session = Session::new(SessionConfig::new(bootstrap.credential), catalog, live);
    session.start();

    let prefs = Preferences { street: args.street.clone(), ..Default::default() };
    for report in 1..=args.reports {
        sleep(Duration::from_secs(args.interval_seconds)).await;

        println!(
            "--- report {}/{} at {} | session {:?} | {} vehicles ---",
            report,
            args.reports,
            chrono::Utc::now().format("%H:%M:%S"),
            session.state(),
            board.get_live_state().len()
        );
        match board.compose(&prefs) {
            BoardView::Ready(view) => {
                for row in view.rows {
                    let marker = if row.border { "=" } else { " " };
                    println!("{} {:<32} {}", marker, row.name, row.vehicles.join(", "));
                }
            }
            other => println!("{:?}", other),
        }
    }

    session.stop().await;
    Ok(())
}
