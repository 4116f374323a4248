//! Data carried between the object store, the file service and the HTTP layer.
//!
//! Nothing here is persisted by the gateway: every value is built from a live
//! store round-trip and lives for the duration of one request.

pub mod object;
