use anyhow::Result;
use clap::Parser;

use tailsync::cli::ClientOpts;

fn main() -> Result<()> {
    let opts = ClientOpts::parse();
    tailsync::client::run(&opts.host, opts.port, &opts.source)
}
