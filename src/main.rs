//! Power usage monitoring agent, republishing battery figures to expvar and Prometheus.

#[macro_use]
extern crate log;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use monitor_power::config::{self, Options};
use monitor_power::errors::Error;
use monitor_power::exporters::get_monitor_power_version;
use monitor_power::service::{self, Action, Systemd, SERVICE_DESCRIPTION, SERVICE_NAME};
use std::time::Duration;

// the struct below defines the main monitor-power command-line interface
/// Power usage monitoring agent.
#[derive(Parser)]
#[command(author, version)]
struct Cli {
    /// Manage monitor-power as a system service instead of running it
    #[command(subcommand)]
    action: Option<ActionChoice>,

    /// HTTP listen address of the stats, a bare `:port` listens on every interface
    #[arg(long, default_value = config::DEFAULT_HTTP)]
    http: String,

    /// The underlying OS, selecting the sensor
    #[arg(long, default_value = config::DEFAULT_OS)]
    os: String,

    /// Time interval of metrics collect, such as 500ms, 1s or 2m
    #[arg(long, default_value = config::DEFAULT_COLLECT_INTERVAL, value_parser = parse_duration)]
    collect: Duration,

    /// Reduction interval of the expvar duration and counter observers
    #[arg(long, default_value = config::DEFAULT_REDUCE_INTERVAL, value_parser = parse_duration)]
    reduce_interval: Duration,

    /// Increase the verbosity level
    #[arg(short, action = ArgAction::Count, default_value_t = 0)]
    verbose: u8,

    /// Don't print the header to the standard output
    #[arg(long, default_value_t = false)]
    no_header: bool,
}

/// Defines the possible subcommands, one per service action.
///
/// ### Description style
/// Per the clap documentation, the description of commands and arguments should be written in the style applied here,
/// *not* in the third-person. That is, use "Do xyz" instead of "Does xyz".
#[derive(Subcommand, Clone, Copy)]
enum ActionChoice {
    /// Install the systemd service, started with the given options
    Install,
    /// Start the installed service
    Start,
    /// Stop the running service
    Stop,
    /// Show whether the service is running
    Status,
    /// Remove the installed service
    Remove,
}

impl From<ActionChoice> for Action {
    fn from(choice: ActionChoice) -> Self {
        match choice {
            ActionChoice::Install => Action::Install,
            ActionChoice::Start => Action::Start,
            ActionChoice::Stop => Action::Stop,
            ActionChoice::Status => Action::Status,
            ActionChoice::Remove => Action::Remove,
        }
    }
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    config::parse_duration(text).map_err(|err| err.to_string())
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = loggerv::init_with_verbosity(cli.verbose.into()) {
        eprintln!("unable to initialize the logger: {err}");
    }

    let opts = Options {
        http: cli.http,
        os: cli.os,
        collect_interval: cli.collect,
        reduce_interval: cli.reduce_interval,
    };

    let result = match cli.action {
        Some(choice) => query_service(Action::from(choice), &opts),
        None => {
            if !cli.no_header {
                print_monitor_power_header(&opts);
            }
            monitor_power::run(opts)
        }
    };

    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}

/// Runs a service action and prints its status line.
fn query_service(action: Action, opts: &Options) -> Result<(), Error> {
    let manager = Systemd::new(SERVICE_NAME, SERVICE_DESCRIPTION)?;
    let status = service::run_action(&manager, action, opts)?;
    println!("{status}");
    Ok(())
}

fn print_monitor_power_header(opts: &Options) {
    let title = format!("monitor-power {}", get_monitor_power_version());
    println!("{}", title.red().bold());
    println!("Sending ⚡ metrics on {}", opts.http);
}
