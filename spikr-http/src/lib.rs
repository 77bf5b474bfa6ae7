#![forbid(unsafe_code)]

mod client;
mod error;
mod estimate;
mod issuer;
mod outcome;
mod spec;
mod util;

pub use client::{HttpClient, HttpResponse};
pub use error::{Error, Result, TransportErrorKind};
pub use estimate::estimate_request_bytes;
pub use issuer::RequestIssuer;
pub use outcome::{CheckResult, OutcomeStatus, RequestOutcome};
pub use spec::{RequestSpec, StatusCheck};

pub use http::Method;
