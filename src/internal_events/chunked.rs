use std::io;

use metrics::counter;

use super::{InternalEvent, error_stage, error_type};
use crate::Error;

#[derive(Debug)]
pub struct ChunkedFrameSent {
    pub byte_size: usize,
}

impl InternalEvent for ChunkedFrameSent {
    fn emit(self) {
        trace!(message = "Frame sent.", byte_size = %self.byte_size);
        counter!("component_sent_events_total").increment(1);
        counter!("component_sent_bytes_total").increment(self.byte_size as u64);
    }
}

#[derive(Debug)]
pub struct ChunkedFrameReceived {
    pub byte_size: usize,
}

impl InternalEvent for ChunkedFrameReceived {
    fn emit(self) {
        trace!(message = "Frame received.", byte_size = %self.byte_size);
        counter!("component_received_events_total").increment(1);
        counter!("component_received_bytes_total").increment(self.byte_size as u64);
    }
}

#[derive(Debug)]
pub struct ChunkedWriteError<'a> {
    pub error: &'a io::Error,
    pub written: usize,
}

impl InternalEvent for ChunkedWriteError<'_> {
    fn emit(self) {
        error!(
            message = "Failed writing frame.",
            error = %self.error,
            written = %self.written,
            error_type = error_type::IO_FAILED,
            stage = error_stage::SENDING,
        );
        counter!(
            "component_errors_total",
            "error_type" => error_type::IO_FAILED,
            "stage" => error_stage::SENDING,
        )
        .increment(1);
    }
}

/// Flush failures never reach the caller of `ChunkedWriter::write`, so this is
/// the only trace they leave.
#[derive(Debug)]
pub struct ChunkedFlushError<'a> {
    pub error: &'a io::Error,
}

impl InternalEvent for ChunkedFlushError<'_> {
    fn emit(self) {
        warn!(
            message = "Failed flushing frame; error discarded.",
            error = %self.error,
            error_type = error_type::FLUSH_FAILED,
            stage = error_stage::SENDING,
        );
        counter!(
            "component_errors_total",
            "error_type" => error_type::FLUSH_FAILED,
            "stage" => error_stage::SENDING,
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct ChunkedFramingError<'a> {
    pub error: &'a Error,
}

impl InternalEvent for ChunkedFramingError<'_> {
    fn emit(self) {
        let error_type = match self.error {
            Error::Io { .. } => error_type::IO_FAILED,
            _ => error_type::PARSER_FAILED,
        };
        error!(
            message = "Failed reading frame.",
            error = %self.error,
            error_code = "chunked_frame",
            error_type,
            stage = error_stage::RECEIVING,
        );
        counter!(
            "component_errors_total",
            "error_code" => "chunked_frame",
            "error_type" => error_type,
            "stage" => error_stage::RECEIVING,
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct ChunkedDecodeError<'a> {
    pub error: &'a prost::DecodeError,
    pub byte_size: usize,
}

impl InternalEvent for ChunkedDecodeError<'_> {
    fn emit(self) {
        error!(
            message = "Failed decoding frame payload.",
            error = %self.error,
            byte_size = %self.byte_size,
            error_code = "chunked_decode",
            error_type = error_type::DECODER_FAILED,
            stage = error_stage::PROCESSING,
        );
        counter!(
            "component_errors_total",
            "error_code" => "chunked_decode",
            "error_type" => error_type::DECODER_FAILED,
            "stage" => error_stage::PROCESSING,
        )
        .increment(1);
    }
}
