mod gateway;
mod poller;
mod proxy;
mod retry;

pub use gateway::{CaseStatusGateway, FetchConfig, FetchError, UscisStatusClient};
pub use poller::{PollError, SamplingPlan, SamplingPoller};
pub use proxy::{proxy_url, rotate_with_probe, VerifiedProxy};
pub use retry::{retry_with_policy, RetryPolicy};
