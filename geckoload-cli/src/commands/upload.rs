//! Upload command implementation.

use anyhow::{Context, Result};
use console::style;
use geckoload::{Command, Connection, Payload, Progress, upload};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use std::path::Path;

use crate::{Cli, Settings, use_fancy_output};

/// Load `file` and upload it to BootMii as `command`.
///
/// The file is read and size-checked before the device is touched.
pub(crate) fn cmd_upload(cli: &Cli, settings: &Settings, command: Command, file: &Path) -> Result<()> {
    let payload = Payload::from_file(file)
        .with_context(|| format!("cannot upload {}", file.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} using {}",
            style("🔌").cyan(),
            style(settings.port.backend.describe()).bold()
        );
    }

    let mut conn = Connection::open_with_options(&settings.port, settings.options)
        .context("error opening the device")?;
    debug!("Connected: {conn:?}");

    if !cli.quiet {
        eprintln!(
            "{} {} {} ({} bytes)",
            style("📦").cyan(),
            command,
            file.display(),
            payload.len()
        );
    }

    let pb = progress_bar(cli, &payload)?;
    upload(&mut conn, command, payload.as_bytes(), |p: Progress| {
        pb.set_position(p.bytes_sent as u64);
        pb.set_message(format!("block {}/{}", p.block, p.blocks));
    })
    .with_context(|| format!("{command} of {} failed", file.display()))?;
    pb.finish_and_clear();

    conn.close();

    if !cli.quiet {
        eprintln!("{} done.", style("✓").green());
    }

    Ok(())
}

fn progress_bar(cli: &Cli, payload: &Payload) -> Result<ProgressBar> {
    if cli.quiet || !use_fancy_output() {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(payload.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .context("invalid progress template")?
        .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    Ok(pb)
}
