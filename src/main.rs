mod asset;
mod auth;
mod commands;
mod context;
mod error;
mod options;
mod shotgrid_api;

use std::{env, panic, process};

use anyhow::Result;
use backtrace::Backtrace;
use clap::{error::ErrorKind, Parser};
use tokio::signal;

use crate::commands::{Command, CommandOutput};
use crate::options::Options;

async fn run(options: Options) -> Result<(), anyhow::Error> {
    match options.command {
        Some(Command::Upload(sub_options)) => commands::upload(options.global, sub_options).await,
        None => commands::download(options.global).await,
    }
}

/// Parse arguments, turning anything but `--help` and `--version` into a JSON
/// usage error so callers only ever have to parse one shape of output.
fn parse_options() -> Options {
    match Options::try_parse() {
        Ok(options) => options,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => err.exit(),
            kind => {
                let reason = kind.as_str().unwrap_or("invalid arguments");
                if let Err(print_err) = CommandOutput::<()>::usage_error(reason).print() {
                    eprintln!("{:?}", print_err);
                    process::exit(1);
                }
                process::exit(0);
            }
        },
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    panic::set_hook(Box::new(|panic_info| {
        // PanicInfo's payload is usually a &'static str or String.
        // See: https://doc.rust-lang.org/beta/std/panic/struct.PanicInfo.html#method.payload
        let message = match panic_info.payload().downcast_ref::<&str>() {
            Some(&message) => message.to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(message) => message.clone(),
                None => "<no message>".to_string(),
            },
        };

        eprintln!("shotgrid-sync crashed!");
        eprintln!("This is probably a bug in shotgrid-sync, not in your files or your ShotGrid site.");
        eprintln!();
        eprintln!("If you can reproduce this crash, try adding the -v, -vv, or -vvv flags.");
        eprintln!("This might give you more information to figure out what went wrong!");
        eprintln!();
        eprintln!("Details: {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!("in file {} on line {}", location.file(), location.line());
        }

        // When using the backtrace crate, we need to check the RUST_BACKTRACE
        // environment variable ourselves.
        let should_backtrace = env::var("RUST_BACKTRACE")
            .map(|var| var == "1")
            .unwrap_or(false);

        if should_backtrace {
            eprintln!("{:?}", Backtrace::new());
        } else {
            eprintln!(
                "note: run with `RUST_BACKTRACE=1` environment variable to display a backtrace."
            );
        }

        process::exit(1);
    }));

    let options = parse_options();

    let log_filter = match options.global.verbosity {
        0 => "info",
        1 => "info,shotgrid_sync=debug",
        2 => "info,shotgrid_sync=trace",
        _ => "trace",
    };

    // Upload mode reserves stdout for its JSON result. The download sweep has
    // no result, so its progress goes to stdout.
    let log_target = match options.command {
        Some(_) => env_logger::Target::Stderr,
        None => env_logger::Target::Stdout,
    };

    let log_env = env_logger::Env::default().default_filter_or(log_filter);

    env_logger::Builder::from_env(log_env)
        .format_module_path(false)
        .format_timestamp(None)
        // Indent following lines equal to the log level label, like `[ERROR] `
        .format_indent(Some(8))
        .target(log_target)
        .init();

    tokio::select! {
        result = run(options) => {
            if let Err(err) = result {
                log::error!("command exited with error {:?}", err);
                process::exit(1);
            }
        },
        _ = signal::ctrl_c() => {
            log::info!("caught ctrl-c, exiting now");
            process::exit(0);
        }
    }
}
