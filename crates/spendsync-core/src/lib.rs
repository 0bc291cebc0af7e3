//! spendsync-core - Building blocks for resilient batch uploads
//!
//! Line items, owner routing, batch partitioning, the blocking HTTP
//! transport and the authentication handshake used by the upload engine.

pub mod error;
pub mod http;
pub mod logging;
pub mod partition;
pub mod progress;
pub mod record;
pub mod token;

// Re-exports for convenience
pub use error::{AuthError, BatchFailure};
pub use http::{
    HttpReply, HttpRequest, HttpTransport, Method, SHARED_RUNTIME, SUCCESS_STATUS, Transport,
    TransportError, join_url,
};
pub use logging::{IndicatifLogger, init_logging};
pub use partition::{Batch, MAX_BATCH_SIZE, Partition, Partitioner};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use record::{DEFAULT_OWNER_FIELD, OwnerDirectory, OwnerLookup, Record, normalize_key};
pub use token::{AUTH_TOKEN_HEADER, Credential, Identity, TokenProvider};
