// SPDX-License-Identifier: MIT OR Apache-2.0

//! Basic trust pipeline example.
//!
//! This example demonstrates:
//! - Creating users with the built-in roles
//! - Submitting a legacy environment document and reading the migrated result
//! - Seeing an insecure production document rejected
//! - Sealing a validated configuration and opening it again
//!
//! To run this example:
//! ```bash
//! cargo run --example basic_usage
//! ```

use serde_json::json;
use trustcfg::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    println!("=== Trust Pipeline: Basic Usage Example ===\n");

    let pipeline = TrustPipeline::builder().build();
    pipeline
        .access()
        .create_user(User::new("dev").with_role("developer"))?;
    pipeline
        .access()
        .create_user(User::new("ops").with_role("operator"))?;

    // A flat document in the old environment-variable style
    let legacy = json!({
        "API_BASE_URL": "http://localhost:3000",
        "DEBUG": "true",
        "API_TIMEOUT": "45000",
    });
    let context = SanitizationContext::new(Environment::Development);
    let outcome = pipeline.submit("dev", &legacy, "runtime", &context).await?;

    println!("Detected format: {}", outcome.format);
    for warning in &outcome.sanitization.warnings {
        println!("  warning [{}] {}", warning.code, warning.message);
    }
    if let Some(migration) = &outcome.migration {
        for entry in &migration.migration_log {
            println!("  migration: {}", entry);
        }
    }
    println!(
        "Accepted configuration:\n{}\n",
        serde_json::to_string_pretty(outcome.configuration.payload())?
    );

    // Plain http is never accepted for production
    let production = SanitizationContext::new(Environment::Production);
    match pipeline
        .submit("ops", &json!({ "API_BASE_URL": "http://evil.test" }), "environment", &production)
        .await
    {
        Ok(_) => println!("Unexpectedly accepted an insecure production document"),
        Err(e) => println!("Rejected production document: {}\n", e),
    }

    // Seal and open
    let (key, metadata) = pipeline
        .encryption()
        .generate_master_key(Environment::Development)?;
    println!("Generated key {} (version {})", metadata.key_id, metadata.version);

    let blob = pipeline
        .seal("dev", &outcome.configuration, &key, None)
        .await?;
    println!("Sealed blob: {} bytes of ciphertext", blob.data.len());

    let opened = pipeline
        .unseal(
            "dev",
            &blob,
            &key,
            &EncryptionContext::new(Environment::Development, "runtime"),
        )
        .await?;
    println!("Opened blob sealed at {}", opened.metadata.encrypted_at);

    println!("\nAudit trail:");
    for entry in pipeline.access().audit_log() {
        println!(
            "  {} {}:{} in {} -> {}",
            entry.user_id, entry.resource, entry.action, entry.environment, entry.granted
        );
    }

    Ok(())
}
