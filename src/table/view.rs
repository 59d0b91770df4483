// Table view store: props in, memoised rows and window out.
//
// Dependency graph:
//   rows   <- resources, filter, sort, grouping, expanded
//   window <- rows, scroll offset
// A derived value is rebuilt only when one of its inputs changed revision.

use std::ops::Deref;
use std::sync::Arc;

use crate::models::Resource;
use crate::selectors::{
    GroupingMode, SortDirection, SortKey, group_resources, resource_matches, sort_resources,
};

use super::window::{RowWindow, WindowConfig};

/// Label shown for the group of resources without a cluster id.
pub const UNGROUPED_LABEL: &str = "Standalone";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRow {
    GroupHeader {
        key: Option<String>,
        label: String,
        count: usize,
    },
    /// Index into the view's resource list.
    Resource { index: usize },
    /// Drawer row following the expanded resource.
    Detail { index: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    pub include_sources: Vec<String>,
    pub exclude_sources: Vec<String>,
    /// Case-insensitive substring match on name, display name, id and hostname.
    pub search: Option<String>,
}

impl TableFilter {
    fn matches_search(&self, r: &Resource) -> bool {
        let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return true;
        };
        let term = term.to_lowercase();
        [
            Some(r.name.as_str()),
            r.display_name.as_deref(),
            Some(r.id.as_str()),
            r.hostname.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
    }
}

/// A resource together with its position in the view's list.
#[derive(Clone, Copy)]
struct Indexed<'a> {
    index: usize,
    resource: &'a Resource,
}

impl Deref for Indexed<'_> {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        self.resource
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeCounts {
    pub rows: u64,
    pub window: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Revisions {
    resources: u64,
    filter: u64,
    sort: u64,
    grouping: u64,
    expanded: u64,
    scroll: u64,
}

type RowsDeps = (u64, u64, u64, u64, u64);
type WindowDeps = (u64, u64);

struct RowsMemo {
    deps: RowsDeps,
    generation: u64,
    rows: Arc<[TableRow]>,
    resource_rows: usize,
    visible: Arc<[usize]>,
}

pub struct TableView {
    config: WindowConfig,
    resources: Arc<[Resource]>,
    filter: TableFilter,
    sort: (SortKey, SortDirection),
    grouping: GroupingMode,
    expanded: Option<String>,
    scroll_offset: usize,
    revisions: Revisions,
    rows_memo: Option<RowsMemo>,
    window_memo: Option<(WindowDeps, RowWindow)>,
    counts: RecomputeCounts,
}

impl TableView {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            resources: Arc::from(Vec::new()),
            filter: TableFilter::default(),
            sort: (SortKey::Default, SortDirection::Asc),
            grouping: GroupingMode::Flat,
            expanded: None,
            scroll_offset: 0,
            revisions: Revisions::default(),
            rows_memo: None,
            window_memo: None,
            counts: RecomputeCounts::default(),
        }
    }

    /// Snapshots are replaced wholesale, so every call counts as a change.
    pub fn set_resources(&mut self, resources: impl Into<Arc<[Resource]>>) {
        self.resources = resources.into();
        self.revisions.resources += 1;
    }

    pub fn set_filter(&mut self, filter: TableFilter) {
        if self.filter != filter {
            self.filter = filter;
            self.revisions.filter += 1;
        }
    }

    pub fn set_sort(&mut self, key: SortKey, direction: SortDirection) {
        if self.sort != (key, direction) {
            self.sort = (key, direction);
            self.revisions.sort += 1;
        }
    }

    pub fn set_grouping_mode(&mut self, mode: GroupingMode) {
        if self.grouping != mode {
            self.grouping = mode;
            self.revisions.grouping += 1;
        }
    }

    pub fn set_expanded_resource(&mut self, id: Option<String>) {
        if self.expanded != id {
            self.expanded = id;
            self.revisions.expanded += 1;
        }
    }

    pub fn set_scroll_offset(&mut self, offset: usize) {
        if self.scroll_offset != offset {
            self.scroll_offset = offset;
            self.revisions.scroll += 1;
        }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, index: usize) -> Option<&Resource> {
        self.resources.get(index)
    }

    pub fn recompute_counts(&self) -> RecomputeCounts {
        self.counts
    }

    /// Full row list (headers, resource rows, detail row).
    pub fn rows(&mut self) -> Arc<[TableRow]> {
        self.ensure_rows();
        match &self.rows_memo {
            Some(memo) => memo.rows.clone(),
            None => Arc::from(Vec::new()),
        }
    }

    /// Resource indices that survived filtering, in sorted order.
    pub fn visible_resources(&mut self) -> Arc<[usize]> {
        self.ensure_rows();
        match &self.rows_memo {
            Some(memo) => memo.visible.clone(),
            None => Arc::from(Vec::new()),
        }
    }

    pub fn window(&mut self) -> RowWindow {
        self.ensure_rows();
        let (generation, resource_rows, total) = match &self.rows_memo {
            Some(m) => (m.generation, m.resource_rows, m.rows.len()),
            None => (0, 0, 0),
        };
        let deps = (generation, self.revisions.scroll);
        if let Some((d, w)) = &self.window_memo
            && *d == deps
        {
            return *w;
        }
        let w = self
            .config
            .compute(resource_rows, total, self.scroll_offset);
        self.counts.window += 1;
        tracing::trace!(
            start = w.start,
            end = w.end,
            total = w.total,
            windowed = w.windowed,
            "table window recomputed"
        );
        self.window_memo = Some((deps, w));
        w
    }

    /// Rows inside the current window.
    pub fn mounted_rows(&mut self) -> Vec<TableRow> {
        let rows = self.rows();
        let w = self.window();
        rows[w.start..w.end].to_vec()
    }

    fn ensure_rows(&mut self) {
        let r = self.revisions;
        let deps = (r.resources, r.filter, r.sort, r.grouping, r.expanded);
        if self.rows_memo.as_ref().is_some_and(|m| m.deps == deps) {
            return;
        }

        let include: Vec<&str> = self.filter.include_sources.iter().map(String::as_str).collect();
        let exclude: Vec<&str> = self.filter.exclude_sources.iter().map(String::as_str).collect();
        let search = |r: &Resource| self.filter.matches_search(r);
        let predicates: [&dyn Fn(&Resource) -> bool; 1] = [&search];
        let filtered: Vec<Indexed<'_>> = self
            .resources
            .iter()
            .enumerate()
            .filter(|(_, r)| resource_matches(r, &include, &exclude, &predicates))
            .map(|(index, resource)| Indexed { index, resource })
            .collect();
        let sorted = sort_resources(&filtered, self.sort.0, self.sort.1);
        let groups = group_resources(&sorted, self.grouping);

        let mut rows = Vec::with_capacity(sorted.len() + groups.len() + 1);
        let mut visible = Vec::with_capacity(sorted.len());
        for group in &groups {
            if self.grouping == GroupingMode::Grouped {
                rows.push(TableRow::GroupHeader {
                    key: group.key.clone(),
                    label: group
                        .key
                        .clone()
                        .unwrap_or_else(|| UNGROUPED_LABEL.to_string()),
                    count: group.resources.len(),
                });
            }
            for r in &group.resources {
                let index = r.index;
                rows.push(TableRow::Resource { index });
                visible.push(index);
                if self.expanded.as_deref() == Some(r.id.as_str()) {
                    rows.push(TableRow::Detail { index });
                }
            }
        }

        let generation = self.rows_memo.as_ref().map_or(1, |m| m.generation + 1);
        self.counts.rows += 1;
        tracing::debug!(
            resources = self.resources.len(),
            visible = visible.len(),
            rows = rows.len(),
            grouping = ?self.grouping,
            "table rows recomputed"
        );
        self.rows_memo = Some(RowsMemo {
            deps,
            generation,
            resource_rows: visible.len(),
            rows: Arc::from(rows),
            visible: Arc::from(visible),
        });
    }
}
