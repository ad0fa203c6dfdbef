//! Turn a raw terminal capture into settled text.
//!
//! Reads the capture on stdin, prints every row that scrolls off the top of
//! a virtual screen as it goes, then prints the final screen.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read, Write};
use ttyharness::{Screen, ScrollbackObserver};

#[derive(Parser, Debug)]
#[command(name = "vtclean", about = "Render a raw terminal capture as plain text", version)]
struct Args {
    /// Screen height
    #[arg(long, default_value_t = 20)]
    rows: usize,

    /// Screen width
    #[arg(long, default_value_t = 500)]
    cols: usize,
}

struct RowPrinter<W: Write>(W);

impl<W: Write> ScrollbackObserver for RowPrinter<W> {
    fn row_evicted(&mut self, row: &[u8]) -> io::Result<()> {
        self.0.write_all(row)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut screen = Screen::new(args.rows, args.cols);
    let mut out = RowPrinter(io::BufWriter::new(io::stdout().lock()));

    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; 4096];
    loop {
        let n = stdin.read(&mut buf).context("Failed to read input")?;
        if n == 0 {
            break;
        }
        screen
            .feed(&buf[..n], &mut out)
            .context("Failed to write output")?;
    }

    out.0.write_all(&screen.snapshot())?;
    out.0.flush()?;
    Ok(())
}
