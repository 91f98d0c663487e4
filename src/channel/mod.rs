//! Channel identities and their allocator.
//!
//! - [`ChannelId`] tagged `{class, number}` identity of one live worker
//! - [`ChannelAllocator`] two wrapping 16-bit counters, one per source class

mod allocator;
mod id;

pub use allocator::ChannelAllocator;
pub use id::{ChannelId, FILE_TAG};
