//! Repository traits for the storage boundary
//!
//! The application's document store holds far more than this crate touches;
//! these traits define exactly the slice the security core reads and writes.
//! Lockout and session-activity state is process-local by design and does
//! not cross this boundary.

pub mod mfa;

pub use mfa::MfaRepository;
