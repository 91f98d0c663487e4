use crate::channel::ChannelId;

/// Caller-supplied values for a dynamic `add`.
///
/// Each field fills the placeholder of the same name in the template's input
/// and output URLs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestParams {
    pub username: String,
    pub password: String,
    /// Source ip.
    pub ip: String,
    /// Source-side channel, not the allocated one.
    pub channel: String,
    /// Required for file-backed ingests.
    pub starttime: Option<String>,
    /// Required for file-backed ingests.
    pub endtime: Option<String>,
}

/// How a worker entered the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerOrigin {
    /// Materialised from configuration at startup or reload.
    Static,
    /// Created through `add`; the source tuple used for deduplication.
    Dynamic { ip: String, channel: String },
}

/// What `add` hands back to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub channel: ChannelId,
    /// Resolved output URL the encoder publishes to.
    pub output_url: String,
}
