// Resource table: memoised row model, row windowing, text rendering.

mod render;
mod view;
mod window;

pub use render::{
    RenderedRow, RenderedTable, ResourceCells, format_percent, format_rate, render_table,
};
pub use view::{RecomputeCounts, TableFilter, TableRow, TableView, UNGROUPED_LABEL};
pub use window::{RowWindow, WindowConfig};
