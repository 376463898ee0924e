//! # Recovery Phrase Demo
//!
//! Demonstrates BIP39 mnemonic generation and validation.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example recovery_phrase_demo
//! ```

use cloak_core::crypto::RustCryptoProvider;
use cloak_core::RecoveryPhrase;

fn main() {
    tracing_subscriber::fmt().init();

    println!("=== Cloak Core: Recovery Phrase (BIP39) Demo ===\n");

    // Step 1: Explain BIP39
    println!("Step 1: Understanding BIP39 Mnemonics");
    println!();
    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                    BIP39 OVERVIEW                           │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │  128 bits entropy ──► SHA256 checksum ──► 132 bits total   │");
    println!("  │                                                             │");
    println!("  │  132 bits / 11 bits per word = 12 words                    │");
    println!("  │                                                             │");
    println!("  │  Each 11-bit segment maps to one of 2048 English words     │");
    println!("  │                                                             │");
    println!("  │  Checksum: Last word includes verification bits            │");
    println!("  │            (catches typos during recovery)                 │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    // Step 2: Generate a recovery phrase
    println!("Step 2: Generating new recovery phrase...");

    let phrase = RecoveryPhrase::generate(&RustCryptoProvider).expect("Failed to generate phrase");
    let words = phrase.words();

    println!();
    println!("  ┌────────────────────────────────────────────────────────────┐");
    println!("  │                   YOUR RECOVERY PHRASE                     │");
    println!("  ├────────────────────────────────────────────────────────────┤");

    for (i, chunk) in words.chunks(4).enumerate() {
        print!("  │  ");
        for (j, word) in chunk.iter().enumerate() {
            let num = i * 4 + j + 1;
            print!("{:2}. {:10}", num, word);
        }
        println!("│");
    }

    println!("  └────────────────────────────────────────────────────────────┘");
    println!();

    // Step 3: Validate phrase
    println!("Step 3: Validating the phrase...");

    match RecoveryPhrase::validate(&phrase.phrase()) {
        Ok(()) => println!("  [OK] Phrase is valid (checksum verified)"),
        Err(e) => println!("  [FAILED] Phrase invalid: {}", e),
    }
    println!();

    // Step 4: Test invalid phrases
    println!("Step 4: Demonstrating validation failures...");
    println!();

    match RecoveryPhrase::validate("abandon abandon abandon") {
        Ok(()) => println!("  Short phrase: [FAILED] Should have been rejected!"),
        Err(_) => println!("  Short phrase (3 words): [OK] Correctly rejected"),
    }

    let bad_checksum = ["abandon"; 12].join(" ");
    match RecoveryPhrase::validate(&bad_checksum) {
        Ok(()) => println!("  Bad checksum: [FAILED] Should have been rejected!"),
        Err(_) => println!("  Bad checksum: [OK] Correctly rejected"),
    }

    for word in ["abandon", "zebra", "cloak"] {
        let status = if RecoveryPhrase::is_valid_word(word) {
            "in wordlist"
        } else {
            "not in wordlist"
        };
        println!("  \"{}\": {}", word, status);
    }
    println!();

    // Step 5: Autocomplete
    println!("Step 5: Autocomplete suggestions for \"ab\"...");
    println!("  {}", RecoveryPhrase::suggest_words("ab").join(", "));
    println!();

    println!("=== Demo Complete ===");
}
