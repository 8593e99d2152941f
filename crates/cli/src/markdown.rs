//! Markdown rendering of changes tables and report listings.

use benchwatch_core::changes::format_value;
use benchwatch_engine::{ChangesTable, ReportListings};
use benchwatch_storage::ReportListing;
use std::fmt::{self, Write};

/// Render a changes table as markdown.
pub fn changes_table(table: &ChangesTable) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail.
    let _ = write_changes_table(&mut output, table);
    output
}

fn write_changes_table(out: &mut String, table: &ChangesTable) -> fmt::Result {
    writeln!(out, "# Changes for {}", table.revision)?;
    writeln!(out)?;
    writeln!(
        out,
        "Executable: **{}**, environment: **{}**, trend window: {} revisions",
        table.executable.name, table.environment.name, table.trend_window
    )?;
    writeln!(out)?;

    if let Some(previous) = &table.previous {
        writeln!(out, "Previous: {}", previous.description)?;
    }
    if let Some(next) = &table.next {
        writeln!(out, "Next: {}", next.description)?;
    }
    if table.previous.is_some() || table.next.is_some() {
        writeln!(out)?;
    }

    if table.is_empty() {
        writeln!(out, "No results for these parameters.")?;
        return Ok(());
    }

    for group in &table.groups {
        writeln!(out, "## {} ({})", group.units_title, group.units)?;
        writeln!(out)?;
        writeln!(out, "| Benchmark | Baseline | Result | Std dev | Change | Status |")?;
        writeln!(out, "|-----------|----------|--------|---------|--------|--------|")?;
        for row in &group.rows {
            writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                row.benchmark,
                row.old_value.map(format_value).unwrap_or_else(|| "-".to_string()),
                format_value(row.new_value),
                row.std_dev.map(format_value).unwrap_or_else(|| "-".to_string()),
                row.delta,
                row.classification
            )?;
        }
        if let Some(avg) = group.average_change {
            writeln!(out)?;
            writeln!(out, "Average change: {:+.2}%", avg)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "---")?;
    writeln!(out, "Report: {}", table.report.colorcode)?;
    Ok(())
}

/// Render the latest and the significant reports.
pub fn report_listings(listings: &ReportListings) -> String {
    let mut output = String::new();
    let _ = write_listing(&mut output, "Latest reports", &listings.latest);
    let _ = writeln!(output);
    let _ = write_listing(&mut output, "Significant reports", &listings.significant);
    output
}

fn write_listing(out: &mut String, title: &str, reports: &[ReportListing]) -> fmt::Result {
    writeln!(out, "# {}", title)?;
    writeln!(out)?;
    if reports.is_empty() {
        writeln!(out, "None.")?;
        return Ok(());
    }
    writeln!(out, "| Date | Project | Revision | Executable | Environment | Status | Summary |")?;
    writeln!(out, "|------|---------|----------|------------|-------------|--------|---------|")?;
    for listing in reports {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} |",
            listing.revision_date.format("%Y-%m-%d %H:%M"),
            listing.project,
            benchwatch_core::model::short_commitid(&listing.commitid),
            listing.executable,
            listing.environment,
            listing.report.colorcode,
            listing.report.item_description.replace('\n', "<br>")
        )?;
    }
    Ok(())
}
