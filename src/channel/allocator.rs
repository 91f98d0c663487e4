//! # Channel allocator.
//!
//! Two wrapping 16-bit counters, one per [`SourceClass`]. Each allocation bumps
//! the class counter, skips zero on wrap-around and probes the registry until a
//! free id turns up.
//!
//! ```text
//! allocate(class, in_use)
//!   loop (at most 65535 probes) {
//!     ├─► counter += 1 (wrapping; 0 → 1)
//!     ├─► id = {class, counter}
//!     └─► in_use(id) ? retry : return id
//!   }
//!   └─► AllocationExhausted
//! ```
//!
//! Probing degrades toward linear in registry size as a class fills up; channel
//! counts are small relative to 65535 in practice.

use crate::channel::ChannelId;
use crate::error::IngestError;
use crate::templates::SourceClass;

/// Issues collision-free channel ids partitioned by source class.
#[derive(Debug, Default, Clone)]
pub struct ChannelAllocator {
    stream: u16,
    file: u16,
}

impl ChannelAllocator {
    /// Creates an allocator with both counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first id of `class` for which `in_use` is false.
    pub fn allocate<F>(&mut self, class: SourceClass, in_use: F) -> Result<ChannelId, IngestError>
    where
        F: Fn(&ChannelId) -> bool,
    {
        let counter = match class {
            SourceClass::Stream => &mut self.stream,
            SourceClass::File => &mut self.file,
        };

        for _ in 0..u16::MAX {
            *counter = counter.wrapping_add(1);
            if *counter == 0 {
                *counter = 1;
            }
            let Some(id) = ChannelId::new(class, *counter) else {
                continue;
            };
            if !in_use(&id) {
                return Ok(id);
            }
        }
        Err(IngestError::AllocationExhausted(class.as_str()))
    }
}
