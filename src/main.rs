extern crate clap;

use std::io::{self, IsTerminal};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::Verbosity;
use colored::{ColoredString, Colorize};
use log::LevelFilter;
use tokio::sync::Notify;

use sip_alg_check::alg::{
    check_sip_alg, AlgCheckConfig, AlgReport, AlgVerdict, DEFAULT_SIP_PORT,
};
use sip_alg_check::engine::{MonitorConfig, MonitorEngine};
use sip_alg_check::errors::{format_error_for_display, CheckError};
use sip_alg_check::monitor::{MonitorSession, SessionLimit, DEFAULT_INTERVAL_MS};
use sip_alg_check::probe::{ProbeStrategy, DEFAULT_TCP_PORT};
use sip_alg_check::quality::{CallQuality, QualityScore};
use sip_alg_check::report::SessionReport;
use sip_alg_check::snapshot::Snapshot;
use sip_alg_check::tui::{
    CheckPhase, DisplayMode, ProgressCallback, ProgressEvent, TuiController,
};

/// How often the TUI is redrawn and the keyboard polled.
const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(author, version = version(), about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Host name or IP address to probe
    #[arg(long, global = true, default_value = MonitorConfig::DEFAULT_TARGET)]
    target: String,

    /// Number of latency samples kept for statistics
    #[arg(long, global = true, default_value_t = MonitorConfig::DEFAULT_SAMPLE_SIZE)]
    sample_size: usize,

    /// Stop after this many probes
    #[arg(long, global = true, conflicts_with = "duration")]
    count: Option<u64>,

    /// Stop after this many seconds
    #[arg(long, global = true)]
    duration: Option<u64>,

    /// Milliseconds between probes
    #[arg(long, global = true, default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// Per-probe timeout in milliseconds
    #[arg(long, global = true, default_value_t = MonitorConfig::DEFAULT_PROBE_TIMEOUT_MS)]
    timeout: u64,

    /// How to measure round trips
    #[arg(long, global = true, value_enum, default_value_t = StrategyArg::Auto)]
    strategy: StrategyArg,

    /// TCP port used by the tcp strategy
    #[arg(long, global = true, default_value_t = DEFAULT_TCP_PORT)]
    port: u16,

    /// Local address to assume instead of discovering it
    #[arg(long, global = true)]
    local_ip: Option<IpAddr>,

    /// SIP port checked by the ALG heuristic
    #[arg(long, global = true, default_value_t = DEFAULT_SIP_PORT)]
    sip_port: u16,

    /// Print the final report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Print plain lines instead of the full-screen display
    #[arg(long, global = true)]
    no_tui: bool,

    /// Also write the JSON report to this file
    #[arg(long, global = true, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Only run the SIP ALG heuristic
    Alg,
    /// Only monitor latency, jitter and packet loss
    Monitor,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StrategyArg {
    Auto,
    Icmp,
    Tcp,
}

impl StrategyArg {
    /// `None` lets the engine detect the best strategy.
    fn probe_strategy(self) -> Option<ProbeStrategy> {
        match self {
            StrategyArg::Auto => None,
            StrategyArg::Icmp => Some(ProbeStrategy::Icmp),
            StrategyArg::Tcp => Some(ProbeStrategy::TcpConnect),
        }
    }
}

fn version() -> &'static str {
    match option_env!("SIPALG_BUILD_GIT_HASH") {
        Some(hash) => Box::leak(
            format!("{} (rev {})", env!("CARGO_PKG_VERSION"), hash).into_boxed_str(),
        ),
        None => env!("CARGO_PKG_VERSION"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mode =
        DisplayMode::detect(cli.json, cli.no_tui, io::stdout().is_terminal());

    // Log lines would tear the alternate screen.
    let level = match mode {
        DisplayMode::Tui => LevelFilter::Off,
        _ => cli.verbose.log_level_filter(),
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = run(cli, mode).await {
        eprintln!("{}", format_error_for_display(&e).red());
        process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, mode: DisplayMode) -> Result<(), CheckError> {
    let (run_alg, run_monitor) = match cli.command {
        None => (true, true),
        Some(Command::Alg) => (true, false),
        Some(Command::Monitor) => (false, true),
    };

    let alg_config = AlgCheckConfig {
        local_ip: cli.local_ip,
        sip_port: cli.sip_port,
        ..AlgCheckConfig::default()
    };

    // Set up the engine before touching the terminal so configuration and
    // permission errors are printed normally.
    let session = if run_monitor {
        let mut config = MonitorConfig::new(cli.target.clone())
            .with_sample_size(cli.sample_size)
            .with_probe_timeout(Duration::from_millis(cli.timeout))
            .with_tcp_port(cli.port);
        if let Some(strategy) = cli.strategy.probe_strategy() {
            config = config.with_strategy(strategy);
        }

        let limit = match (cli.count, cli.duration) {
            (Some(count), _) => SessionLimit::Count(count),
            (None, Some(secs)) => SessionLimit::Duration(Duration::from_secs(secs)),
            (None, None) => SessionLimit::Unbounded,
        };

        let engine = MonitorEngine::connect(config)?;
        Some(MonitorSession::new(engine, Duration::from_millis(cli.interval), limit)?)
    } else {
        None
    };

    let mut controller = TuiController::new(mode);
    let callback: Option<Arc<dyn ProgressCallback>> = match mode {
        DisplayMode::Tui => Some(controller.progress_callback()),
        DisplayMode::Plain => Some(Arc::new(PlainProgress)),
        DisplayMode::Json => None,
    };
    let emit = |event: ProgressEvent| {
        if let Some(ref callback) = callback {
            callback.on_progress(event);
        }
    };

    controller.init()?;

    let alg = if run_alg {
        emit(ProgressEvent::PhaseChange(CheckPhase::AlgCheck));
        controller.render()?;
        let report = check_sip_alg(&alg_config).await;
        emit(ProgressEvent::AlgResult(report.clone()));
        Some(report)
    } else {
        None
    };

    let network = match session {
        Some(mut session) => {
            let engine = session.engine();
            emit(ProgressEvent::MonitorStarted {
                target: engine.target().to_string(),
                strategy: engine.probe().strategy(),
            });
            if let Some(ref callback) = callback {
                session = session.with_callback(Arc::clone(callback));
            }

            let quit = Arc::new(Notify::new());
            let stop = {
                let quit = Arc::clone(&quit);
                async move {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = quit.notified() => {}
                    }
                }
            };

            let run = session.run(stop);
            tokio::pin!(run);
            let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

            let snapshot = loop {
                tokio::select! {
                    snapshot = &mut run => break snapshot,
                    _ = redraw.tick() => {
                        controller.render()?;
                        if controller.poll_quit()? {
                            quit.notify_one();
                        }
                    }
                }
            };
            Some(snapshot)
        }
        None => None,
    };

    let report = SessionReport::new(alg, network);
    emit(ProgressEvent::PhaseChange(CheckPhase::Complete));

    match mode {
        DisplayMode::Json => println!("{}", report.to_json_pretty()?),
        DisplayMode::Tui => {
            controller.show_results(&report)?;
            // Written before leaving the alternate screen so a failure is
            // shown next to the results.
            let written = match cli.output {
                Some(ref path) => report.write_to(path),
                None => Ok(()),
            };
            if let Err(ref e) = written {
                controller.set_error(e.message.clone(), e.suggestion.clone());
                controller.render()?;
            }
            controller.wait_for_key()?;
            controller.cleanup()?;
            print_summary(&report);
            return written;
        }
        DisplayMode::Plain => print_summary(&report),
    }

    if let Some(ref path) = cli.output {
        report.write_to(path)?;
    }

    Ok(())
}

/// Prints one line per probe.
struct PlainProgress;

impl ProgressCallback for PlainProgress {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::MonitorStarted { target, strategy } => {
                println!(
                    "{} {} {}",
                    "Probing:".bold().white(),
                    target.bright_blue(),
                    format!("({})", strategy).bright_blue()
                );
            }
            ProgressEvent::Sample { sequence, latency_ms, snapshot } => {
                let latency = match latency_ms {
                    Some(ms) => latency_colored(ms),
                    None => "timeout".red(),
                };
                println!(
                    "#{:<5} {}  loss {:.2}%  jitter {:.2} ms",
                    sequence, latency, snapshot.packet_loss_percent, snapshot.jitter_ms
                );
            }
            _ => {}
        }
    }
}

fn latency_colored(ms: f64) -> ColoredString {
    let text = format!("{:.2} ms", ms);
    if ms < 80.0 {
        text.green()
    } else if ms < 150.0 {
        text.yellow()
    } else {
        text.red()
    }
}

fn print_summary(report: &SessionReport) {
    if let Some(ref alg) = report.alg {
        print_alg(alg);
    }
    if let Some(ref snapshot) = report.network {
        print_network(snapshot, report.quality.as_ref());
    }
}

fn print_alg(alg: &AlgReport) {
    let local_ip = alg
        .local_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let verdict = match alg.verdict {
        AlgVerdict::Unlikely => alg.verdict.to_string().green(),
        AlgVerdict::Possible => alg.verdict.to_string().yellow(),
        AlgVerdict::Likely => alg.verdict.to_string().red(),
    };

    println!("{} {}", "Local IP:".bold().white(), local_ip.bright_blue());
    println!("{} {}", "Behind NAT:".bold().white(), yes_no(alg.behind_nat));
    println!(
        "{} {}",
        "SIP port bind failed:".bold().white(),
        yes_no(alg.sip_port_bind_failed)
    );
    println!("{} {}", "SIP ALG (heuristic):".bold().white(), verdict.bold());
    println!("{}", alg.recommendation);
}

fn print_network(snapshot: &Snapshot, quality: Option<&CallQuality>) {
    println!("{} {}", "Target:".bold().white(), snapshot.target.bright_blue());
    println!(
        "{} {} sent, {} received, {}",
        "Packets:".bold().white(),
        snapshot.packets_sent,
        snapshot.packets_received,
        format!("{:.2}% loss", snapshot.packet_loss_percent).bright_cyan()
    );
    println!(
        "{} avg {} min {:.2} ms max {:.2} ms",
        "Latency:".bold().white(),
        latency_colored(snapshot.avg_latency_ms),
        snapshot.min_latency_ms,
        snapshot.max_latency_ms
    );
    println!("{} {:.2} ms", "Jitter:".bold().white(), snapshot.jitter_ms);

    if let Some(quality) = quality {
        let score = match quality.score {
            QualityScore::Great | QualityScore::Good => {
                quality.score.description().green()
            }
            QualityScore::Average => quality.score.description().yellow(),
            QualityScore::Poor => quality.score.description().red(),
        };
        println!(
            "{} {} (MOS {:.2}, R {:.1})",
            "Call quality:".bold().white(),
            score,
            quality.mos,
            quality.r_factor
        );
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
