/// Compact codec for inline-button payloads
pub mod callback;
/// Command, message and callback handlers
pub mod handlers;
/// Document and link ingestion pipeline
pub mod ingest;
/// Validated inline keyboards
pub mod keyboard;
/// Outbound platform boundary
pub mod messenger;
/// Response shapes and the edit-vs-send dispatch protocol
pub mod response;
/// User-facing texts and keyboards
pub mod views;
