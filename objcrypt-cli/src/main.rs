mod client;
mod get;
mod opts;
mod util;

use crate::opts::{Opts, Subcommand};
use clap::Parser;
use log::error;

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let opts = Opts::parse();

    let res = match opts.subcmd {
        Subcommand::Get(o) => crate::get::exec(o).await,
    };

    if let Err(e) = res {
        error!("{e}");
        std::process::exit(1);
    }
}
