use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared HTTP client for every storage backend instance.
///
/// Per-upload deadlines are enforced by the explorer, so only the connect phase
/// gets a timeout here.
pub static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("storage-explorer/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build reqwest client")
});
