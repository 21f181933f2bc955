//! GitLab REST API v4 client for access-token queries.

mod client;
mod types;

pub use client::{GitLabClient, TokenSource};
pub use types::{AccessToken, PersonalAccessToken};
