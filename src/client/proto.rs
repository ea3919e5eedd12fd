//! Push wire format, hand-derived with prost.
//!
//! ```protobuf
//! message PushRequest {
//!     repeated StreamAdapter streams = 1;
//! }
//!
//! message StreamAdapter {
//!     string labels = 1;
//!     repeated EntryAdapter entries = 2;
//! }
//!
//! message EntryAdapter {
//!     google.protobuf.Timestamp timestamp = 1;
//!     string line = 2;
//! }
//! ```

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct PushRequest {
    #[prost(message, repeated, tag = "1")]
    pub streams: Vec<StreamAdapter>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StreamAdapter {
    /// Canonical label string, e.g. `{app="web", env="prod"}`.
    #[prost(string, tag = "1")]
    pub labels: String,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<EntryAdapter>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EntryAdapter {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<prost_types::Timestamp>,
    #[prost(string, tag = "2")]
    pub line: String,
}
