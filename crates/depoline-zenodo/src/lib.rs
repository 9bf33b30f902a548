//! depoline-zenodo: Zenodo deposition client

pub mod client;
pub mod token;

pub use client::{ZenodoClient, error_reason, request_body};
pub use token::{PRODUCTION_URL, SANDBOX_URL, api_url, load_token};
