pub mod api_client;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod export;
pub mod filter_state;
pub mod logging;
pub mod saved_marks;
pub mod selection;

#[cfg(test)]
mod test_export_job;
#[cfg(test)]
mod test_filter_state;
