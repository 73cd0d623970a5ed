//! chainvisord: declarative statement-chain supervision daemon.
//!
//! Reads the configuration document, builds the module registry, and runs the
//! [`Daemon`] on a current-thread runtime until a termination signal has been
//! handled.
//!
//! Exit code is 1 on any failure and on normal completion after a
//! termination signal; 0 only for `--help`/`--version`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;

use chainvisor::logging::{self, Level, LogOptions, LoggerKind};
use chainvisor::{config, Daemon, ModuleRegistry};

/// Declarative statement-chain supervision daemon.
#[derive(Parser, Debug)]
#[command(name = "chainvisord")]
#[command(version, about, long_about = None)]
struct Args {
    /// Logging sink.
    #[arg(long, value_enum, default_value = "stdout")]
    logger: LoggerKind,

    /// Syslog facility name.
    #[cfg(unix)]
    #[arg(long, default_value = "daemon")]
    syslog_facility: String,

    /// Syslog identification string.
    #[cfg(unix)]
    #[arg(long, default_value = "chainvisord")]
    syslog_ident: String,

    /// Default log level: 0-5 or none|error|warning|notice|info|debug.
    #[arg(long, value_parser = logging::parse_level)]
    loglevel: Option<Level>,

    /// Per-channel log level override; repeatable.
    #[arg(
        long = "channel-loglevel",
        num_args = 2,
        value_names = ["CHANNEL", "LEVEL"],
        action = clap::ArgAction::Append
    )]
    channel_loglevel: Vec<String>,

    /// Path to the configuration file.
    #[arg(long, required = true)]
    config_file: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("chainvisord: {e:#}");
    }
    // The daemon's job is to stay up; reaching this point, even cleanly
    // after a termination signal, is reported as failure.
    ExitCode::from(1)
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut channel_levels = Vec::new();
    for pair in args.channel_loglevel.chunks(2) {
        let [channel, level] = pair else {
            return Err(anyhow!("--channel-loglevel requires two arguments"));
        };
        if logging::channel_target(channel).is_none() {
            return Err(anyhow!(
                "unknown log channel '{channel}' (known: {})",
                logging::LOG_CHANNELS.join(", ")
            ));
        }
        let level = logging::parse_level(level).map_err(|e| anyhow!(e))?;
        channel_levels.push((channel.clone(), level));
    }

    let opts = LogOptions {
        logger: args.logger,
        default_level: args.loglevel,
        channel_levels,
        #[cfg(unix)]
        syslog_facility: args.syslog_facility,
        #[cfg(unix)]
        syslog_ident: args.syslog_ident,
    };
    logging::init(&opts).context("failed to initialize logger")?;

    info!(
        target: "chainvisor::daemon",
        "initializing chainvisor {}", env!("CARGO_PKG_VERSION")
    );

    let text = std::fs::read_to_string(&args.config_file).with_context(|| {
        format!("failed to read config file {}", args.config_file.display())
    })?;
    let document = config::parse(&text).context("failed to parse config file")?;

    let daemon = Daemon::new(document, ModuleRegistry::builtin());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(daemon.run())?;

    info!(target: "chainvisor::daemon", "exiting");
    Ok(())
}
