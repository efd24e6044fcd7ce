//! Internal events emitted while framing and deframing.
//!
//! Each event logs through `tracing` and counts through `metrics`. Nothing is
//! recorded unless the embedding application installs a subscriber or a
//! recorder.

mod chunked;

pub use self::chunked::*;

/// Something observable that happened inside the crate.
pub trait InternalEvent: Sized {
    /// Logs and records the event.
    fn emit(self);
}

/// Emits `event`. Prefer the [`emit!`] macro.
pub fn emit(event: impl InternalEvent) {
    event.emit();
}

/// Emits an [`InternalEvent`].
macro_rules! emit {
    ($event:expr) => {
        $crate::internal_events::emit($event)
    };
}

/// Values for the `stage` tag of error events.
pub mod error_stage {
    /// Pulling frames off the transport.
    pub const RECEIVING: &str = "receiving";
    /// Interpreting frame payloads.
    pub const PROCESSING: &str = "processing";
    /// Pushing frames onto the transport.
    pub const SENDING: &str = "sending";
}

/// Values for the `error_type` tag of error events.
pub mod error_type {
    /// The transport failed.
    pub const IO_FAILED: &str = "io_failed";
    /// The byte stream does not follow the framing format.
    pub const PARSER_FAILED: &str = "parser_failed";
    /// A frame payload could not be turned into a message.
    pub const DECODER_FAILED: &str = "decoder_failed";
    /// The transport could not be forced to deliver buffered bytes.
    pub const FLUSH_FAILED: &str = "flush_failed";
}
