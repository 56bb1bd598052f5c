mod utils;

pub mod config;
pub mod cookie;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod form;
pub mod header;
pub mod log;
pub mod viewstate;

pub use config::Config;
pub use exchange::{Request, Response};
pub use filter::{FilterChain, FilterUnit, Stage};

#[macro_use]
extern crate lazy_static;
