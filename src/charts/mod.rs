// Chart data for the metric overlay: range cache, background poller, series lookup.

mod cache;
mod lookup;
mod poller;

pub use cache::{ChartCache, ChartSource, FetchError, FetchOutcome, FetchTicket};
pub use lookup::{agent_key, find_chart_data, resolve_series};
pub use poller::{ChartPoller, spawn_supervisor};
