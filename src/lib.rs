pub mod agent;
pub mod bucket;
pub mod classifier;
pub mod config;
pub mod error;
pub mod error_info;
pub mod headers;
pub mod metrics;
pub mod policy;
pub mod request;
pub mod response;
pub mod route;
pub mod token_bucket;
pub mod transport;

pub use agent::Agent;
pub use bucket::{BucketHandle, BucketStore, ClientId, InMemoryBucketStore};
pub use classifier::{classify, Action, Classifier, RetryCause};
pub use config::Config;
pub use error::{AgentError, Result, Severity};
pub use error_info::ErrorInfo;
pub use headers::ClientHeaders;
pub use policy::RetryPolicy;
pub use request::Request;
pub use response::Response;
pub use route::Route;
pub use transport::{ReqwestTransport, Transport};
pub use tokio_util::sync::CancellationToken;
