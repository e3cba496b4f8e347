use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use traffic_live::config::{self, TrafficConfig};
use traffic_live::logging::init_logging;
use traffic_live::state::DashboardSnapshot;
use traffic_live::{run_tick, DashboardState, Granularity, HttpFeedSource, Poller};

#[derive(Parser)]
#[command(name = "traffic-live", version)]
#[command(about = "Live vehicle-count ingestion: polls, deduplicates and windows traffic telemetry")]
struct Cli {
    /// Config file (default: ./traffic-live.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll continuously until Ctrl-C
    Run {
        #[arg(long)] base_url:    Option<String>,
        #[arg(long)] camera_id:   Option<String>,
        #[arg(long)] interval_ms: Option<u64>,
    },

    /// Run a single poll cycle and print the snapshot
    Once {
        #[arg(long)] base_url:  Option<String>,
        #[arg(long)] camera_id: Option<String>,
        /// Day for the day summary (YYYY-MM-DD, default today)
        #[arg(long)] date:      Option<String>,
        #[arg(long)] json:      bool,
    },

    /// List cameras known to the source
    Cameras {
        #[arg(long)] base_url: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        config::default_config()
    });

    match cli.command {
        Command::Run { base_url, camera_id, interval_ms } => {
            apply_overrides(&mut cfg, base_url, camera_id);
            if let Some(ms) = interval_ms { cfg.poll.interval_ms = ms; }
            print_startup_info(&cfg);

            let source = HttpFeedSource::new(&cfg.feed)?;
            let handle = Poller::new(source, &cfg).spawn();
            let mut snapshots = handle.subscribe();

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl-C received, stopping");
                        break;
                    }
                    changed = snapshots.changed() => {
                        if changed.is_err() { break; }
                        let snap = snapshots.borrow_and_update().clone();
                        if !snap.fetching {
                            info!("{}", format_tally(&snap));
                        }
                    }
                }
            }

            let state = handle.stop().await?;
            info!(
                accepted = state.accumulator().accepted(),
                lifetime_total = state.totals().sum(),
                tracked_keys = state.dedup().tracked_keys(),
                "Shut down"
            );
        }

        Command::Once { base_url, camera_id, date, json } => {
            apply_overrides(&mut cfg, base_url, camera_id);
            if date.is_some() { cfg.feed.summary_date = date; }
            let source = HttpFeedSource::new(&cfg.feed)?;
            let mut state = DashboardState::new(&cfg);
            let report = run_tick(&source, &mut state).await;
            for (feed, err) in &report.failed {
                eprintln!("{} feed: {}", feed, err);
            }

            let snap = state.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snap)?);
            } else {
                print_snapshot(&snap);
            }
        }

        Command::Cameras { base_url } => {
            apply_overrides(&mut cfg, base_url, None);
            let source = HttpFeedSource::new(&cfg.feed)?;
            let cameras = source.cameras().await?;
            if cameras.is_empty() {
                println!("No cameras reported.");
            } else {
                for cam in cameras {
                    println!("{}", cam);
                }
            }
        }
    }
    Ok(())
}

fn apply_overrides(cfg: &mut TrafficConfig, base_url: Option<String>, camera_id: Option<String>) {
    if let Some(u)  = base_url  { cfg.feed.base_url  = u; }
    if let Some(id) = camera_id { cfg.feed.camera_id = Some(id); }
}

fn format_tally(snap: &DashboardSnapshot) -> String {
    let live = snap
        .live
        .iter()
        .map(|t| format!("{} {}{}", t.class.as_str(), t.count, t.trend.symbol()))
        .collect::<Vec<_>>()
        .join("  ");
    match &snap.error {
        Some(err) => format!("{} | {}", live, err),
        None => format!("{} | lifetime {} | {:?}", live, snap.lifetime_total, snap.status),
    }
}

fn print_snapshot(snap: &DashboardSnapshot) {
    if let Some(err) = &snap.error {
        println!("!! {}", err);
    }
    println!("Live:      {}", format_tally(snap));
    if let Some(summary) = &snap.summary {
        println!(
            "Last hour: car {}  bike {}  truck {}  bus {}  auto {}  (total {})",
            summary.counts.car, summary.counts.bike, summary.counts.truck,
            summary.counts.bus, summary.counts.auto, summary.total,
        );
    }
    if let Some(day) = &snap.day_summary {
        println!(
            "Day {}: car {}  bike {}  truck {}  bus {}  auto {}  (total {}, {} records)",
            day.date.as_deref().unwrap_or("today"),
            day.counts.car, day.counts.bike, day.counts.truck,
            day.counts.bus, day.counts.auto, day.total, day.record_count,
        );
        if let Some(hour) = &day.peak_hour {
            println!("Day peak:  {} ({} vehicles)", hour, day.peak_hour_count);
        }
    }
    if let Some(peak) = &snap.hour_peak {
        println!("Peak hour: {} ({} vehicles)", peak.label, peak.total);
    }

    for (granularity, rows) in [
        (Granularity::Second, &snap.second),
        (Granularity::Hour, &snap.hour),
        (Granularity::Day, &snap.day),
    ] {
        println!();
        println!("{:<8} {:<10} {:<12} {:>5} {:>5} {:>5} {:>5} {:>5} {:>6}",
            granularity.as_str(), "Time", "Camera", "Car", "Bike", "Truck", "Bus", "Auto", "Total");
        println!("{}", "─".repeat(70));
        if rows.is_empty() {
            println!("(no data)");
        }
        for r in rows.iter() {
            println!("{:<8} {:<10} {:<12} {:>5} {:>5} {:>5} {:>5} {:>5} {:>6}",
                "", r.label, r.camera_id, r.counts.car, r.counts.bike,
                r.counts.truck, r.counts.bus, r.counts.auto, r.total);
        }
    }
}

fn print_startup_info(cfg: &TrafficConfig) {
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║            TRAFFIC LIVE                                  ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("  Source:    {}", cfg.feed.base_url);
    println!("  Camera:    {}", cfg.feed.camera_id.as_deref().unwrap_or("all"));
    println!("  Interval:  {} ms", cfg.poll.interval_ms);
    println!("  Windows:   second {} / hour {} / day {}",
        cfg.window.second_cap,
        cfg.window.hour_cap,
        cfg.window.day_cap.map(|c| c.to_string()).unwrap_or_else(|| "all".into()));
    println!("╚══════════════════════════════════════════════════════════╝");
}
