use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::repair::RepairState;
use crate::report::TestStatus;

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

pub fn status_cell(status: TestStatus) -> Cell {
    let cell = Cell::new(status.label());
    match status {
        TestStatus::Passed => cell.fg(TableColor::Green),
        TestStatus::Failed | TestStatus::Errored => cell.fg(TableColor::Red),
        TestStatus::Skipped => cell.fg(TableColor::DarkGrey),
    }
}

pub fn repair_state_cell(state: &RepairState) -> Cell {
    let cell = Cell::new(state.label());
    match state {
        RepairState::Fixed { .. } => cell.fg(TableColor::Green),
        RepairState::Exhausted { .. } => cell.fg(TableColor::Red),
        RepairState::Skipped { .. } | RepairState::Pending | RepairState::Attempting { .. } => {
            cell.fg(TableColor::Yellow)
        }
    }
}
