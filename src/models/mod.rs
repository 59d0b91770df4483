// Domain models: resources, metric series, time ranges

mod chart;
mod range;
mod resource;

pub use chart::{ChartData, ChartMap, Metric, MetricPoint, chart_data_has_points};
pub use range::{RangeParseError, TimeRange, parse_duration};
pub use resource::{
    DiskIoRate, NetworkRate, Resource, ResourceSnapshot, ResourceStatus, ResourceType,
};
