// Library for tests to access modules

pub mod charts;
pub mod collector;
pub mod config;
pub mod history;
pub mod models;
pub mod rollup_worker;
pub mod routes;
pub mod selectors;
pub mod state;
pub mod table;
pub mod worker;
