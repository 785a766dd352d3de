//! `tracing` subscriber setup. Everything goes to stderr so stdout only ever
//! carries decision and report documents.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub quiet: bool,
    pub json: bool,
    pub color: bool,
}

impl LogOptions {
    fn default_directive(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

/// `RUST_LOG` wins over the verbosity flags when set.
pub fn init(opts: LogOptions) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.default_directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = if opts.json {
        builder.json().try_init()
    } else {
        builder.with_ansi(opts.color).try_init()
    };
}
