//! Typed domain models for the ingest pipeline

pub mod candidate;
pub mod entities;
pub mod record;
pub mod session;

pub use candidate::{EnrichmentStatus, PendingCandidate, PendingReason};
pub use entities::{
    Address, Characteristics, DecomposedRow, EventSource, LastSale, LifeEvent, Owner, Phone,
    Property, SaleRecord, Valuation,
};
pub use record::RawRecord;
pub use session::{SessionError, SessionStatus, UploadSession, MAX_CAPTURED_ERRORS};
