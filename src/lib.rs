//! Transcoding proxy for the EBD handheld browser.
//!
//! The client cannot parse modern HTML or decode modern image formats, so
//! this server sits between it and the web: it fetches pages, reduces the
//! markup to the tag subset the client understands, recompresses every
//! inline image into one of the client's EBD bitmap modes, and frames the
//! result the way the client expects.
//!
//! Pipeline per request: upstream HTML -> tokenizer -> (text emitted, image
//! slots reserved) -> concurrent per-image fetch / decode / scale /
//! quantize+dither / bitmap encode / envelope -> splice -> size-checked
//! concatenation -> framed response.

pub mod color;
pub mod config;
pub mod cookies;
pub mod dither;
pub mod ebd;
pub mod fetch;
pub mod html;
pub mod server;
pub mod svg;
