pub mod error;
pub use error::ApiError;

pub mod extract;
pub use extract::{Extracted, Heuristic, find_task};

mod normalize;
pub use normalize::{BooleanFields, Normalizer, ResponseTransformer, unwrap_envelope};

mod pool;
pub use pool::{WorkerPool, shutdown_shared};

mod poller;
pub use poller::{PollHandle, StatusSource, TaskPoller};

mod timeout;
pub use timeout::TimeoutGuard;

mod request;
pub use request::{ApiRequest, CallFuture, Completion, RequestDefaults, Submitted};

mod transport;
pub use transport::{HttpRequest, HttpResponse, Method, Transport};

mod client;
pub use client::ApiClient;

pub use pve_model::{RetryPolicy, TaskStatus, Upid, UpidError};
