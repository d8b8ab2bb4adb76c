//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `homestash_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("homestash_core ping={}", homestash_core::ping());
    println!("homestash_core version={}", homestash_core::core_version());
}
