/// Typed errors for the library surface. Pipeline tasks wrap these in
/// `anyhow` and log; nothing here is fatal to ingestion.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RankingError {
    /// The registry changed since the view was last sorted or revalidated.
    #[error("ranking view is stale (view generation {view}, registry generation {registry})")]
    Stale { view: u64, registry: u64 },
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("could not read roster {path:?}: {source}")]
    Read {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("roster parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("empty feed line")]
    Empty,
    #[error("bad timestamp {0:?}")]
    Timestamp(String),
    #[error("unknown event keyword {0:?}")]
    Keyword(String),
    #[error("{keyword} expects {expected} fields, got {got}")]
    Arity { keyword: &'static str, expected: usize, got: usize },
    #[error("bad number {0:?}")]
    Number(String),
}
