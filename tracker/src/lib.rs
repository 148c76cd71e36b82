pub mod api;
pub mod attribution;
pub mod company;
pub mod config;
pub mod enrichment;
pub mod notify;
pub mod prometheus;
pub mod router;
pub mod server;
pub mod store;
pub mod time;
pub mod track;
pub mod visitor;
pub mod visitors;
