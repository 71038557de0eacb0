mod client;
mod session;
mod types;

pub use client::TeamCityClient;
pub use session::{BuildSession, SessionState};
pub use types::{BuildRecord, BuildRequest, BuildState, BuildStatus};

#[cfg(test)]
pub(crate) use client::tests::{silent_server, test_client, BASIC_AUTH};
