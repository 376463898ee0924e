//! # Recovery Phrase (BIP39)
//!
//! Twelve-word BIP39 mnemonics shown to the user as a human-readable backup.
//!
//! ## Generation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      BIP39 MNEMONIC GENERATION                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Generate Entropy                                              │
//! │  ────────────────────────────                                           │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │                                                             │       │
//! │  │  128 bits from CryptoProvider::fill_random                 │       │
//! │  │                                                             │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 2: Calculate Checksum                                            │
//! │  ───────────────────────────                                            │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │                                                             │       │
//! │  │  checksum = first 4 bits of SHA256(entropy)                │       │
//! │  │                                                             │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 3: Combine and Split                                             │
//! │  ──────────────────────────                                             │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │                                                             │       │
//! │  │  entropy || checksum = 128 + 4 = 132 bits                  │       │
//! │  │  132 / 11 = 12 indices into the 2048-word English list     │       │
//! │  │                                                             │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Result: 12 words, ~128 bits of entropy, typo-detecting checksum      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Measure |
//! |--------|---------|
//! | Entropy | 128 bits from the crypto provider's CSPRNG |
//! | Checksum | 4 bits catches most typos |
//! | Storage | Phrase should be written down, never stored digitally |
//! | Display | Show once, never log |

use bip39::{Language, Mnemonic};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::crypto::{CryptoProvider, RustCryptoProvider};
use crate::error::{Error, Result};

/// Number of words in a recovery phrase
pub const WORD_COUNT: usize = 12;

/// Entropy size in bytes for 12 words (128 bits)
const ENTROPY_BYTES: usize = 16;

/// Maximum number of autocomplete suggestions
const MAX_SUGGESTIONS: usize = 10;

/// A BIP39 recovery phrase
///
/// ## Security Warning
///
/// - Should be shown to the user exactly once
/// - Should never be logged or stored in plaintext
/// - User should write it down on paper
#[derive(ZeroizeOnDrop)]
pub struct RecoveryPhrase {
    /// The underlying BIP39 mnemonic
    #[zeroize(skip)] // bip39::Mnemonic doesn't implement Zeroize
    mnemonic: Mnemonic,
}

impl RecoveryPhrase {
    /// Generate a new random recovery phrase
    ///
    /// ## Errors
    ///
    /// `EntropyFailure` if the provider cannot supply randomness.
    pub fn generate(provider: &dyn CryptoProvider) -> Result<Self> {
        let mut entropy = Zeroizing::new([0u8; ENTROPY_BYTES]);
        provider.fill_random(&mut entropy[..])?;

        let mnemonic = Mnemonic::from_entropy(&entropy[..]).map_err(|e| {
            Error::KeyDerivationFailed(format!("Failed to generate mnemonic: {}", e))
        })?;

        Ok(Self { mnemonic })
    }

    /// Parse a recovery phrase
    ///
    /// ## Validation
    ///
    /// - Must be exactly 12 words
    /// - All words must be in BIP39 English wordlist
    /// - Checksum must be valid
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let normalized = phrase.to_lowercase();
        let mnemonic = Mnemonic::parse_normalized(&normalized)
            .map_err(|e| Error::InvalidRecoveryPhrase(format!("{}", e)))?;

        if mnemonic.word_count() != WORD_COUNT {
            return Err(Error::InvalidRecoveryPhrase(format!(
                "Expected {} words, got {}",
                WORD_COUNT,
                mnemonic.word_count()
            )));
        }

        Ok(Self { mnemonic })
    }

    /// Parse from a list of words
    pub fn from_words(words: &[&str]) -> Result<Self> {
        if words.len() != WORD_COUNT {
            return Err(Error::InvalidRecoveryPhrase(format!(
                "Expected {} words, got {}",
                WORD_COUNT,
                words.len()
            )));
        }

        Self::from_phrase(&words.join(" "))
    }

    /// Get the words as a vector
    pub fn words(&self) -> Vec<&'static str> {
        self.mnemonic.words().collect()
    }

    /// Get the phrase as a single string (words separated by spaces)
    ///
    /// ## Security Warning
    ///
    /// Only use this for display to user. Never log or store.
    pub fn phrase(&self) -> String {
        self.mnemonic.to_string()
    }

    /// Validate a phrase without keeping it
    ///
    /// Useful for UI validation before submission.
    pub fn validate(phrase: &str) -> Result<()> {
        Self::from_phrase(phrase)?;
        Ok(())
    }

    /// Check if a single word is in the BIP39 wordlist
    pub fn is_valid_word(word: &str) -> bool {
        let word_lower = word.to_lowercase();
        Language::English
            .word_list()
            .iter()
            .any(|w| *w == word_lower)
    }

    /// Get word suggestions for autocomplete
    ///
    /// Returns up to 10 words from the BIP39 wordlist that start with the
    /// given prefix.
    pub fn suggest_words(prefix: &str) -> Vec<&'static str> {
        if prefix.is_empty() {
            return vec![];
        }

        let prefix_lower = prefix.to_lowercase();
        Language::English
            .word_list()
            .iter()
            .filter(|word| word.starts_with(&prefix_lower))
            .take(MAX_SUGGESTIONS)
            .copied()
            .collect()
    }
}

// Prevent accidental logging
impl std::fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecoveryPhrase([REDACTED])")
    }
}

/// Generate a 12-word phrase from the OS CSPRNG
///
/// The phrase carries 128 bits of entropy. The last word holds 7 random bits
/// plus the 4-bit BIP39 checksum, so words are not independent uniform picks.
pub fn generate_recovery_phrase() -> Result<String> {
    Ok(RecoveryPhrase::generate(&RustCryptoProvider)?.phrase())
}

// ============================================================================
// TESTS
// ============================================================================
