//! Concrete crypto collaborators (SPEC_FULL.md §2). Cryptographic
//! primitives are out of scope per spec.md §1; this module exists so the
//! round-trip properties in spec.md §8 have something real to run
//! against.

pub mod aes_provider;

pub use aes_provider::AesCryptoProvider;
