pub(crate) mod client;
pub(crate) mod response;

pub use client::ProbeClient;
pub use response::{body_preview, failure_from_response, failure_from_transport};
