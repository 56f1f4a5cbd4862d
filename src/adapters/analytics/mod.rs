//! Analytics source
//!
//! [`FetchClient`] is the seam the engine fetches through; [`AnalyticsClient`]
//! is its HTTP implementation.

pub mod client;
pub mod models;
pub mod traits;

pub use client::AnalyticsClient;
pub use models::EngageResponse;
pub use traits::{FetchClient, FetchedPage, PageInfo};
