use clap::Parser;
use dpg_rs::config::PlaylistConfig;
use dpg_rs::replay::{IterationReport, Replay, ReplayOptions};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "playlist-sim",
    about = "Replay a playlist.json between a simulated client and server"
)]
struct Args {
    /// Path to playlist.json
    #[arg(long)]
    playlist: PathBuf,

    /// Override the number of iterations
    #[arg(long)]
    iterations: Option<u64>,

    /// Override the random modifier seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the one-way link latency (ms)
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Pre-announce a stop and stop every flow at this time (ms) in each iteration
    #[arg(long)]
    stop_after_ms: Option<u64>,

    /// Print every sent packet as hex
    #[arg(long)]
    trace_packets: bool,
}

fn print_report(report: &IterationReport) {
    let k = report.iteration;
    for p in &report.packets {
        let idx = p
            .pkt_idx
            .map_or_else(|| "-".to_string(), |i| i.to_string());
        println!(
            "packet iteration={k} side={} flow={} idx={idx} len={} data={}",
            p.side,
            p.flow_idx,
            p.bytes.len(),
            hex::encode(&p.bytes)
        );
    }
    for r in &report.flows {
        println!(
            "flow_result iteration={k} side={} flow={} ok={} state={:?} at_ms={}",
            r.side, r.flow_idx, r.successful, r.state, r.at_ms
        );
    }
    for l in &report.loops {
        println!(
            "loop_result iteration={k} begin={} ok={}",
            l.begin, l.successful
        );
    }
    println!(
        "iteration_summary iteration={k} flows_ok={} flows_failed={} loops_ok={} loops_failed={} sent_pkts={} sent_bytes={}",
        report.flows_ok(),
        report.flows_failed(),
        report.loops_ok(),
        report.loops_failed(),
        report.sent_pkts,
        report.sent_bytes
    );
}

fn run(args: Args) -> dpg_rs::Result<()> {
    let mut cfg = PlaylistConfig::from_path(&args.playlist)?;
    if let Some(n) = args.iterations {
        cfg.iterations = n;
    }
    if let Some(seed) = args.seed {
        cfg.modifiers.set_seed(seed);
    }
    if let Some(ms) = args.latency_ms {
        cfg.link_latency_ms = ms;
    }

    let replay = Replay::new(
        cfg,
        ReplayOptions {
            trace_packets: args.trace_packets,
            stop_after_ms: args.stop_after_ms,
        },
    );
    for k in 0..replay.config().iterations {
        let report = replay.run_iteration(k)?;
        print_report(&report);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "playlist_sim failed");
            eprintln!("playlist_sim: {e}");
            ExitCode::FAILURE
        }
    }
}
