use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::model::JobStatus;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn color_coded_status_cell(status: JobStatus, conclusion: Option<&str>) -> Cell {
    let text = match conclusion {
        Some(conclusion) => format!("{status} ({conclusion})"),
        None => status.to_string(),
    };

    match (status, conclusion) {
        (JobStatus::Completed, Some("success")) => Cell::new(text).fg(TableColor::Green),
        (JobStatus::Completed | JobStatus::Cancelled, _) => Cell::new(text).fg(TableColor::Red),
        (JobStatus::InProgress, _) => Cell::new(text).fg(TableColor::Yellow),
        _ => Cell::new(text).fg(TableColor::DarkGrey),
    }
}

pub fn color_coded_queue_cell(seconds: Option<f64>) -> Cell {
    let Some(seconds) = seconds else {
        return Cell::new("-").fg(TableColor::DarkGrey);
    };

    let text = format!("{seconds:.1}s");
    if seconds <= 30.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if seconds <= 300.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}
