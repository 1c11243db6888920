mod client;
mod credentials;

pub use client::{PlatformClient, PostSource, SortOrder};
pub use credentials::Credentials;
