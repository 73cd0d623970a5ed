//! # Logger selection, levels, and channels.
//!
//! The daemon logs through `tracing` with per-channel leveled filtering.
//! *Channels* are the compile-time list in [`LOG_CHANNELS`]; each maps to a
//! crate module target, so `--channel-loglevel engine debug` raises only the
//! state-engine output.
//!
//! ## Levels
//! The configuration surface keeps the classic six levels, mapped onto
//! tracing's five:
//!
//! | config            | tracing       |
//! |-------------------|---------------|
//! | `0` / `none`      | off           |
//! | `1` / `error`     | `ERROR`       |
//! | `2` / `warning`   | `WARN`        |
//! | `3` / `notice`    | `INFO`        |
//! | `4` / `info`      | `DEBUG`       |
//! | `5` / `debug`     | `TRACE`       |
//!
//! ## Sinks
//! `--logger stdout` writes human-readable lines to stdout. On unix,
//! `--logger syslog` frames each record for `/dev/log` with the configured
//! facility and ident; record severity follows the tracing level.

use thiserror::Error;
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// The compile-time channel enumeration.
pub const LOG_CHANNELS: &[&str] = &["daemon", "engine", "config", "modules", "events"];

/// Maps a channel name to its tracing target.
pub fn channel_target(channel: &str) -> Option<&'static str> {
    match channel {
        "daemon" => Some("chainvisor::daemon"),
        "engine" => Some("chainvisor::engine"),
        "config" => Some("chainvisor::config"),
        "modules" => Some("chainvisor::modules"),
        "events" => Some("chainvisor::events"),
        _ => None,
    }
}

/// A configured log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Logging disabled.
    None,
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warning,
    /// Normal operational messages (the default).
    Notice,
    /// Verbose operational messages.
    Info,
    /// Everything.
    Debug,
}

impl Level {
    /// The directive fragment understood by the filter.
    fn as_directive(self) -> &'static str {
        match self {
            Level::None => "off",
            Level::Error => "error",
            Level::Warning => "warn",
            Level::Notice => "info",
            Level::Info => "debug",
            Level::Debug => "trace",
        }
    }
}

/// Parses `0..5` or `none|error|warning|notice|info|debug`.
///
/// Usable directly as a clap value parser.
pub fn parse_level(s: &str) -> Result<Level, String> {
    match s {
        "0" | "none" => Ok(Level::None),
        "1" | "error" => Ok(Level::Error),
        "2" | "warning" => Ok(Level::Warning),
        "3" | "notice" => Ok(Level::Notice),
        "4" | "info" => Ok(Level::Info),
        "5" | "debug" => Ok(Level::Debug),
        _ => Err(format!(
            "bad log level '{s}' (expected 0-5 or none|error|warning|notice|info|debug)"
        )),
    }
}

/// The logging sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LoggerKind {
    /// Human-readable lines on standard output.
    Stdout,
    /// The local syslog socket (unix only).
    #[cfg(unix)]
    Syslog,
}

/// Resolved logging configuration.
pub struct LogOptions {
    /// Selected sink.
    pub logger: LoggerKind,
    /// Default level for all channels; `None` keeps the built-in default
    /// (notice).
    pub default_level: Option<Level>,
    /// Per-channel overrides as `(channel, level)` pairs.
    pub channel_levels: Vec<(String, Level)>,
    /// Syslog facility name.
    #[cfg(unix)]
    pub syslog_facility: String,
    /// Syslog identification string.
    #[cfg(unix)]
    pub syslog_ident: String,
}

/// Errors raised while initializing the logger.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LogInitError {
    /// A filter directive failed to parse.
    #[error("bad filter directive '{0}'")]
    Directive(String),
    /// An unknown channel name was configured.
    #[error("unknown log channel '{0}'")]
    UnknownChannel(String),
    /// An unknown syslog facility was configured.
    #[error("unknown syslog facility '{0}'")]
    UnknownFacility(String),
    /// The sink could not be opened.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Initializes the global tracing subscriber from the options.
pub fn init(opts: &LogOptions) -> Result<(), LogInitError> {
    let default = opts.default_level.unwrap_or(Level::Notice);
    let mut filter = EnvFilter::try_new(format!("warn,chainvisor={}", default.as_directive()))
        .map_err(|e| LogInitError::Directive(e.to_string()))?;
    for (channel, level) in &opts.channel_levels {
        let target = channel_target(channel)
            .ok_or_else(|| LogInitError::UnknownChannel(channel.clone()))?;
        let directive = format!("{target}={}", level.as_directive());
        let parsed: Directive = directive
            .parse()
            .map_err(|_| LogInitError::Directive(directive.clone()))?;
        filter = filter.add_directive(parsed);
    }

    match opts.logger {
        LoggerKind::Stdout => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
        }
        #[cfg(unix)]
        LoggerKind::Syslog => {
            let writer = syslog::SyslogWriter::connect(&opts.syslog_facility, &opts.syslog_ident)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .without_time()
                        .with_writer(writer),
                )
                .init();
        }
    }

    Ok(())
}

#[cfg(unix)]
mod syslog {
    //! Minimal RFC 3164 framing over the local datagram socket.

    use std::io;
    use std::os::unix::net::UnixDatagram;
    use std::sync::Arc;

    use tracing::Metadata;
    use tracing_subscriber::fmt::MakeWriter;

    use super::LogInitError;

    const SYSLOG_PATH: &str = "/dev/log";

    /// Per-record writer factory for the syslog sink.
    pub(super) struct SyslogWriter {
        socket: Arc<UnixDatagram>,
        ident: String,
        facility: u8,
    }

    impl SyslogWriter {
        pub(super) fn connect(facility: &str, ident: &str) -> Result<Self, LogInitError> {
            let facility = facility_code(facility)
                .ok_or_else(|| LogInitError::UnknownFacility(facility.to_string()))?;
            let socket = UnixDatagram::unbound()?;
            socket.connect(SYSLOG_PATH)?;
            Ok(Self {
                socket: Arc::new(socket),
                ident: ident.to_string(),
                facility,
            })
        }

        fn record(&self, severity: u8) -> SyslogRecord {
            SyslogRecord {
                socket: Arc::clone(&self.socket),
                header: format!(
                    "<{}>{}[{}]: ",
                    (self.facility << 3) | severity,
                    self.ident,
                    std::process::id()
                ),
                buf: Vec::with_capacity(256),
            }
        }
    }

    impl<'a> MakeWriter<'a> for SyslogWriter {
        type Writer = SyslogRecord;

        fn make_writer(&'a self) -> Self::Writer {
            // severity: notice
            self.record(5)
        }

        fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
            let severity = match *meta.level() {
                tracing::Level::ERROR => 3,
                tracing::Level::WARN => 4,
                tracing::Level::INFO => 5,
                tracing::Level::DEBUG => 6,
                tracing::Level::TRACE => 7,
            };
            self.record(severity)
        }
    }

    /// Buffers one formatted record and ships it as a single datagram.
    pub(super) struct SyslogRecord {
        socket: Arc<UnixDatagram>,
        header: String,
        buf: Vec<u8>,
    }

    impl io::Write for SyslogRecord {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for SyslogRecord {
        fn drop(&mut self) {
            let mut msg = self.header.clone().into_bytes();
            let body = match self.buf.split_last() {
                Some((&b'\n', rest)) => rest,
                _ => &self.buf[..],
            };
            msg.extend_from_slice(body);
            // Nothing sensible to do with a send failure from inside logging.
            let _ = self.socket.send(&msg);
        }
    }

    pub(super) fn facility_code(name: &str) -> Option<u8> {
        match name {
            "user" => Some(1),
            "daemon" => Some(3),
            "syslog" => Some(5),
            "local0" => Some(16),
            "local1" => Some(17),
            "local2" => Some(18),
            "local3" => Some(19),
            "local4" => Some(20),
            "local5" => Some(21),
            "local6" => Some(22),
            "local7" => Some(23),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_by_number_and_name() {
        assert_eq!(parse_level("0").unwrap(), Level::None);
        assert_eq!(parse_level("none").unwrap(), Level::None);
        assert_eq!(parse_level("3").unwrap(), Level::Notice);
        assert_eq!(parse_level("warning").unwrap(), Level::Warning);
        assert_eq!(parse_level("5").unwrap(), Level::Debug);
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("6").is_err());
    }

    #[test]
    fn every_channel_has_a_target() {
        for channel in LOG_CHANNELS {
            let target = channel_target(channel).unwrap();
            assert!(target.starts_with("chainvisor::"), "{target}");
        }
        assert!(channel_target("kernel").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn known_facilities_resolve() {
        assert_eq!(syslog::facility_code("daemon"), Some(3));
        assert_eq!(syslog::facility_code("local7"), Some(23));
        assert_eq!(syslog::facility_code("mail?"), None);
    }
}
