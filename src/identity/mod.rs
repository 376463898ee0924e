//! # Identity Module
//!
//! Human-facing backup material for a user's identity.
//!
//! Currently this is the BIP39 recovery phrase: twelve words the user writes
//! down at signup and can later type back in, with per-word validation and
//! autocomplete for the input form.

mod recovery;

pub use recovery::{generate_recovery_phrase, RecoveryPhrase, WORD_COUNT};
