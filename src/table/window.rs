// Row windowing: bounds the number of mounted rows for large resource lists.

use serde::{Deserialize, Serialize};

/// Window tuning. The mount ceiling is `viewport_rows + 2 * overscan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Resource counts at or below this render every row.
    pub threshold: usize,
    pub viewport_rows: usize,
    pub overscan: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            threshold: 250,
            viewport_rows: 100,
            overscan: 20,
        }
    }
}

impl WindowConfig {
    pub fn max_mounted(&self) -> usize {
        self.viewport_rows + 2 * self.overscan
    }

    /// `resource_count` decides whether windowing engages; `total_rows` (headers and detail
    /// rows included) is what the window slices.
    pub fn compute(&self, resource_count: usize, total_rows: usize, offset: usize) -> RowWindow {
        if resource_count <= self.threshold {
            return RowWindow {
                start: 0,
                end: total_rows,
                total: total_rows,
                windowed: false,
            };
        }
        let offset = offset.min(total_rows.saturating_sub(self.viewport_rows));
        let start = offset.saturating_sub(self.overscan);
        let end = (offset + self.viewport_rows + self.overscan).min(total_rows);
        RowWindow {
            start,
            end,
            total: total_rows,
            windowed: true,
        }
    }
}

/// Half-open slice `[start, end)` of the row list that is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowWindow {
    pub start: usize,
    pub end: usize,
    pub total: usize,
    pub windowed: bool,
}

impl RowWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Rows above the window, rendered as spacer height.
    pub fn padding_top(&self) -> usize {
        self.start
    }

    /// Rows below the window, rendered as spacer height.
    pub fn padding_bottom(&self) -> usize {
        self.total - self.end
    }
}
