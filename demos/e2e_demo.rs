//! # End-to-End Encryption Demo
//!
//! Alice sends Bob a message through `CloakCore`, then the two share a
//! group key.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=cloak_core=debug cargo run --example e2e_demo
//! ```

use cloak_core::{codec, CloakCore, CoreConfig, EncryptedMessage, Error};
use tracing_subscriber::EnvFilter;

fn preview(text: &str) -> &str {
    &text[..text.len().min(24)]
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Cloak Core: End-to-End Encryption Demo ===\n");

    // Lower PBKDF2 cost so the demo runs quickly
    let config = CoreConfig {
        kdf_iterations: 100_000,
        ..CoreConfig::default()
    };
    let core = CloakCore::new(config).expect("Failed to build core");

    // Step 1: Both users sign up
    println!("Step 1: Creating password-protected keys for Alice and Bob...");

    let alice = core
        .initialize_user_keys("alice", "correct horse battery staple")
        .await
        .expect("Failed to initialize Alice");
    let bob = core
        .initialize_user_keys("bob", "tr0ub4dor&3")
        .await
        .expect("Failed to initialize Bob");

    println!("  Alice's public key: {}...", preview(&alice.public_key.to_base64()));
    println!("  Bob's public key:   {}...", preview(&bob.public_key.to_base64()));
    println!();

    // Step 2: Alice encrypts for Bob
    println!("Step 2: Alice encrypts a message for Bob...");
    println!();
    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                  PER-MESSAGE KEY AGREEMENT                  │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │   Alice                              Bob                    │");
    println!("  │     │                                  │                    │");
    println!("  │     │  fresh ephemeral key pair        │                    │");
    println!("  │     │  ECDH(ephemeral, Bob public)     │                    │");
    println!("  │     │  HKDF ──► AES-256-GCM key        │                    │");
    println!("  │     │                                  │                    │");
    println!("  │     │── ciphertext, nonce, ephemeral ─►│                    │");
    println!("  │     │                                  │                    │");
    println!("  │     │        ECDH(Bob private, ephemeral)                   │");
    println!("  │     │        HKDF ──► same AES key ──► plaintext            │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    let plaintext = "Hello Bob! This is a secret message from Alice.";
    let message = core
        .encrypt_message(plaintext, &bob.public_key)
        .expect("Encryption failed");
    let wire = message.to_json().expect("Failed to serialize envelope");

    println!("  Plaintext:  \"{}\"", plaintext);
    println!("  Ciphertext: {}...", preview(&codec::encode(&message.ciphertext)));
    println!("  Wire size:  {} bytes", wire.len());

    let again = core
        .encrypt_message(plaintext, &bob.public_key)
        .expect("Encryption failed");
    if again.ephemeral_public_key != message.ephemeral_public_key {
        println!("  [OK] Same plaintext, different ephemeral key (forward secrecy)");
    }
    println!();

    // Step 3: Bob decrypts
    println!("Step 3: Bob unlocks his keys and decrypts...");

    let received = EncryptedMessage::from_json(&wire).expect("Failed to parse envelope");
    let bob_keys = core
        .unlock("bob", "tr0ub4dor&3")
        .await
        .expect("Failed to unlock Bob");

    match core.decrypt_message(&received, &bob_keys) {
        Ok(text) if text == plaintext => println!("  [OK] Decrypted: \"{}\"", text),
        Ok(text) => println!("  [FAILED] Unexpected plaintext: \"{}\"", text),
        Err(e) => println!("  [FAILED] {}", e),
    }
    println!();

    // Step 4: Tampering and wrong passwords
    println!("Step 4: Demonstrating failures...");

    let mut tampered = received.clone();
    tampered.ciphertext[0] ^= 0x01;
    match core.decrypt_message(&tampered, &bob_keys) {
        Err(Error::AuthenticationFailed) => println!("  Tampered ciphertext: [OK] Rejected"),
        other => println!("  Tampered ciphertext: [FAILED] {:?}", other.map(|_| ())),
    }

    let alice_keys = core
        .unlock("alice", "correct horse battery staple")
        .await
        .expect("Failed to unlock Alice");
    match core.decrypt_message(&received, &alice_keys) {
        Err(Error::AuthenticationFailed) => println!("  Wrong recipient:     [OK] Rejected"),
        other => println!("  Wrong recipient:     [FAILED] {:?}", other.map(|_| ())),
    }

    match core.unlock("bob", "guess").await {
        Err(Error::InvalidPassword) => println!("  Wrong password:      [OK] Rejected"),
        other => println!("  Wrong password:      [FAILED] {:?}", other.map(|_| ())),
    }
    println!();

    // Step 5: Group messages
    println!("Step 5: Group message with a shared key...");

    let key = core.groups().rotate("book-club").expect("Failed to create group key");
    let exported = core
        .groups()
        .cipher()
        .export_symmetric_key(&key)
        .expect("Failed to export group key");
    println!("  Group key (distributed out of band): {}...", preview(&exported));

    let group_message = core
        .encrypt_group_message("book-club", "Chapter 3 by Friday")
        .expect("Group encryption failed");
    let text = core
        .decrypt_group_message("book-club", &group_message)
        .expect("Group decryption failed");
    println!("  [OK] Decrypted: \"{}\"", text);
    println!();

    // Step 6: Sign out
    println!("Step 6: Logging out...");
    core.logout();
    println!("  Cached keys: {}, group keys: {}", core.cache().len(), core.groups().len());
    println!();

    println!("=== Demo Complete ===");
}
