pub(crate) mod config;
pub(crate) mod observability;
pub(crate) mod state;
