//! Human readable output for finished commands.

use std::fmt::Write;

use archiver_core::{AuditReport, Post, RunSummary};

pub fn print_posts(posts: &[Post]) {
    print!("{}", format_posts(posts));
}

pub fn print_summary(summary: &RunSummary) {
    print!("{}", format_summary(summary));
}

pub fn print_audit(report: &AuditReport) {
    print!("{}", format_audit(report));
}

fn format_posts(posts: &[Post]) -> String {
    let mut out = String::new();
    for post in posts {
        let _ = writeln!(
            out,
            "{}  {}  {}",
            post.publish_timestamp.format("%Y-%m-%d"),
            post.title,
            post.source_url
        );
    }
    let _ = writeln!(out, "{} post(s)", posts.len());
    out
}

fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    if summary.dry_run {
        for post in &summary.plan {
            let _ = writeln!(out, "{} -> {}", post.source_url, post.document_path);
            for asset in &post.assets {
                let _ = writeln!(out, "  {} {} -> {}", asset.kind, asset.url, asset.local_path);
            }
        }
        let _ = writeln!(out, "dry run: {} post(s) would be archived", summary.plan.len());
    } else {
        let _ = writeln!(
            out,
            "{} listed, {} archived, {} unchanged, {} asset(s) stored, {} bytes written",
            summary.posts_listed,
            summary.posts_archived,
            summary.posts_unchanged,
            summary.assets_stored,
            summary.bytes_written
        );
    }
    if summary.cancelled {
        let _ = writeln!(out, "run was interrupted before every post was listed");
    }
    for reference in &summary.flagged_references {
        let _ = writeln!(out, "left remote: {reference}");
    }
    for failure in &summary.failures {
        let _ = writeln!(out, "failed [{}] {}: {}", failure.class, failure.item, failure.message);
    }
    out
}

fn format_audit(report: &AuditReport) -> String {
    let mut out = String::new();
    for missing in &report.missing {
        match &missing.cause {
            Some(cause) => {
                let _ = writeln!(out, "missing {} ({cause})", missing.entry.path);
            }
            None => {
                let _ = writeln!(out, "missing {}", missing.entry.path);
            }
        }
    }
    for corrupt in &report.corrupt {
        let _ = writeln!(
            out,
            "corrupt {} expected {} found {}",
            corrupt.entry.path, corrupt.expected, corrupt.actual
        );
    }
    let _ = writeln!(
        out,
        "{} checked: {} ok, {} missing, {} corrupt",
        report.total(),
        report.matched.len(),
        report.missing.len(),
        report.corrupt.len()
    );
    out
}
