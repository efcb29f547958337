mod config;
mod crawl;
mod data_io;
mod discover;
mod error;
mod extract;
mod fetch;
mod runtime;
mod types;

#[cfg(test)]
mod test_support;

pub use runtime::run;
