//! Operator command line.

use clap::{ArgGroup, Parser};

use crate::config::{SessionConfig, TraceSettings};
use crate::controller::LaunchTarget;
use crate::tracer::TracePattern;
use crate::{Error, Result};

#[derive(Parser, Debug)]
#[command(name = "xtrace")]
#[command(version)]
#[command(about = "Trace managed or native-object methods: entry, arguments, return value, stack and timing", long_about = None)]
#[command(group(ArgGroup::new("target").args(["spawn", "attach", "attach_frontmost"]).multiple(false)))]
pub struct Cli {
    /// Spawn the application with this identifier, suspended until hooks are installed
    #[arg(short = 's', long = "spawn", value_name = "IDENTIFIER")]
    pub spawn: Option<String>,

    /// Attach to the running application with this identifier or name
    #[arg(short = 'a', long = "attach", value_name = "NAME")]
    pub attach: Option<String>,

    /// Attach to the frontmost application
    #[arg(short = 'F', long = "attach-frontmost")]
    pub attach_frontmost: bool,

    /// Fuzzy-match methods to trace (repeatable)
    #[arg(short = 'i', long = "include-method", value_name = "METHOD")]
    pub include_method: Vec<String>,

    /// Print the call stack on every traced entry
    #[arg(short = 'b', long = "backtrace")]
    pub backtrace: bool,

    /// Print start and end timestamps of every traced call
    #[arg(short = 'd', long = "duration")]
    pub duration: bool,
}

impl Cli {
    pub fn target(&self) -> Result<LaunchTarget> {
        if self.attach_frontmost {
            Ok(LaunchTarget::Frontmost)
        } else if let Some(id) = &self.spawn {
            Ok(LaunchTarget::Spawn(id.clone()))
        } else if let Some(name) = &self.attach {
            Ok(LaunchTarget::Attach(name.clone()))
        } else {
            Err(Error::NoLaunchTarget)
        }
    }

    /// Validate the target selection and build the session configuration.
    pub fn into_launch(self, settings: TraceSettings) -> Result<(LaunchTarget, SessionConfig)> {
        let target = self.target()?;
        let config = SessionConfig {
            include_methods: self.include_method.into_iter().map(TracePattern::new).collect(),
            backtrace: self.backtrace,
            duration: self.duration,
            spawn: matches!(target, LaunchTarget::Spawn(_)),
            settings,
        };
        Ok((target, config))
    }
}

/// Install the diagnostics subscriber (stderr). Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
