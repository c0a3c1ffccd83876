use std::fmt::Write;
use std::path::Path;

use comfy_table::Cell;

use crate::model::Job;
use crate::store::IntakeCounts;

use super::styling::{bright, bright_green, bright_red, bright_yellow, dim};
use super::tables::{color_coded_queue_cell, color_coded_status_cell, create_table, cyan_header};

/// Prints the intake backlog and the most recently updated jobs to stdout.
pub fn print_status(database: &Path, counts: &IntakeCounts, jobs: &[Job]) {
    println!("{}", render_status(database, counts, jobs));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_status(database: &Path, counts: &IntakeCounts, jobs: &[Job]) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📥", "Intake");

    let failed_display = if counts.failed > 0 {
        bright_red(counts.failed)
    } else {
        bright_green(counts.failed)
    };

    let _ = write!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n\n",
        dim("Database:"),
        dim(database.display()),
        dim("Received:"),
        bright_yellow(counts.total()),
        dim("Pending:"),
        bright_yellow(counts.pending),
        dim("Processed:"),
        bright_green(counts.processed),
        dim("Failed:"),
        failed_display,
    );

    add_section_header(&mut output, "⚙️", "Recent Jobs");

    if jobs.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No jobs reconciled yet."));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Job", "Name", "Status", "Labels", "Queued", "Run"]));

    for job in jobs {
        table.add_row(vec![
            Cell::new(job.id),
            Cell::new(&job.name),
            color_coded_status_cell(job.status, job.conclusion.as_deref()),
            Cell::new(job.labels.join("\n")),
            color_coded_queue_cell(job.queue_seconds()),
            Cell::new(job.run_id),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;
    use crate::testing::job;

    fn counts(pending: u64, processed: u64, failed: u64) -> IntakeCounts {
        IntakeCounts {
            pending,
            processed,
            failed,
        }
    }

    #[test]
    fn test_render_status_without_jobs() {
        console::set_colors_enabled(false);
        let output = render_status(Path::new("/tmp/hooks.db"), &counts(0, 0, 0), &[]);

        assert!(output.contains("Intake"));
        assert!(output.contains("/tmp/hooks.db"));
        assert!(output.contains("No jobs reconciled yet."));
    }

    #[test]
    fn test_render_status_lists_jobs() {
        console::set_colors_enabled(false);
        let mut finished = job(7, JobStatus::Completed);
        finished.name = "build".to_string();
        finished.conclusion = Some("success".to_string());

        let output = render_status(
            Path::new("hooks.db"),
            &counts(2, 5, 1),
            &[finished, job(8, JobStatus::Queued)],
        );

        assert!(output.contains("Received: 8"));
        assert!(output.contains("Pending: 2"));
        assert!(output.contains("Failed: 1"));
        assert!(output.contains("build"));
        assert!(output.contains("completed (success)"));
        assert!(output.contains("queued"));
        assert!(!output.contains("No jobs reconciled yet."));
    }
}
