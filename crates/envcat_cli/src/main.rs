//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `envcat_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use std::process::ExitCode;

fn main() -> ExitCode {
    println!("envcat_core ping={}", envcat_core::ping());
    println!("envcat_core version={}", envcat_core::core_version());

    let schema = envcat_core::open_db_in_memory()
        .and_then(|conn| envcat_core::db::migrations::current_user_version(&conn));
    match schema {
        Ok(version) => {
            println!("envcat_core schema_version={version}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("envcat_core schema bootstrap failed: {err}");
            ExitCode::FAILURE
        }
    }
}
