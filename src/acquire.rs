use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::io::Write;

use crate::cli::Cli;
use crate::port::{ByteChannel, open_port};
use crate::proto::session::Session;
use crate::sample::SessionState;
use crate::stats::Tally;

pub const CSV_HEADER: &str = "#,Time,Value";

pub fn run(opts: Cli) -> Result<()> {
    let channel = open_port(&opts.dev, &opts.ser, &opts.timing)
        .with_context(|| format!("opening serial interface {}", opts.dev))?;
    let mut session = Session::new(channel, opts.timing.acquire_timeout());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    drive(&mut session, opts.points, &mut out)?;
    Ok(())
}

/// Full console sequence: sync, identify, measure, then dump the data as CSV.
pub fn drive<C: ByteChannel, W: Write>(
    session: &mut Session<C>,
    points: u64,
    out: &mut W,
) -> Result<Tally> {
    info!("Sending empty command...");
    session.sync_prompt()?;
    info!("Got command prompt.");

    info!("Sending \"id\" command...");
    let id = session.identify()?;
    info!("Device: {}.", id);

    let result = session.run_measurement(points)?;
    if result.announced_points != result.actual_points {
        warn!(
            "Device announced {} point(s) but measured {}.",
            result.announced_points, result.actual_points
        );
    }
    let mut tally = Tally::new();
    if result.actual_points == 0 {
        return Ok(tally);
    }

    info!("Sending \"data\" command...");
    session.fetch_data()?;

    writeln!(out, "{}", CSV_HEADER).context("writing CSV")?;
    let mut state = SessionState::default();
    for line_no in 1..=result.actual_points {
        let line = session.read_line(None)?;
        match state.accept(line_no, &line) {
            Ok(rows) => {
                for row in &rows {
                    writeln!(out, "{}", row).context("writing CSV")?;
                }
                tally.inc_accepted(rows.len());
            }
            Err(e) => {
                warn!("{}. Ignoring...", e);
                tally.inc_skipped();
            }
        }
    }
    out.flush().context("writing CSV")?;

    debug!(
        "layout={:?} baseline={:?} last row={}",
        state.layout(),
        state.baseline(),
        state.running_index()
    );
    info!("Got {} valid data line(s).", tally.accepted);
    tally.log();
    Ok(tally)
}
