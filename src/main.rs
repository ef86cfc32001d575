mod args;
mod meeting;

use std::process::exit;

use chrono::{Local, NaiveDate};
use clap::Parser;
use log::{debug, error};

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    debug!("args: {:?}", args);

    let today = match &args.today {
        None => Local::now().date_naive(),
        Some(s) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(d) => d,
            Err(e) => {
                eprintln!("Invalid --today {:?}: {}", s, e);
                exit(2);
            }
        },
    };

    let res = meeting::run_meeting(
        &args.config,
        args.out.as_deref(),
        args.reference.as_deref(),
        today,
    );

    if let Err(e) = res {
        error!("{:?}", e);
        eprintln!("An error occured: {}", e);
        exit(1);
    }
}
