//! Line-oriented SKVS client: forwards stdin lines and prints each response.
//! A blank line (or end of input) ends the session.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use clap::Parser;

use skvs_client::Client;
use skvs_common::{DEFAULT_PORT, DEFAULT_SERVER_HOST};

/// Send SKVS requests read from stdin.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host name or IP address
    #[arg(short, long, default_value = DEFAULT_SERVER_HOST)]
    ip: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Print a prompt before each request
    #[arg(short = 't', long)]
    interactive: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.port <= 1024 {
        bail!("invalid port number {}", args.port);
    }

    let mut client = Client::connect((args.ip.as_str(), args.port))
        .with_context(|| format!("failed to connect to {}:{}", args.ip, args.port))?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut lines = stdin.lock().lines();
    loop {
        if args.interactive {
            write!(stdout, "> ")?;
            stdout.flush()?;
        }
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        let reply = client.request(line)?;
        writeln!(stdout, "{reply}")?;
    }

    client.disconnect()?;
    Ok(())
}
