mod retry;
pub use retry::RetryPolicy;

mod task_status;
pub use task_status::TaskStatus;

mod upid;
pub use upid::{UPID_PREFIX, Upid, UpidError};
