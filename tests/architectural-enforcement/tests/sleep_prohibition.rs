//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the commentary crates MUST NOT call sleep
//! methods. Timers that pace periodic work use `tokio::time::interval`.
//! **Exceptions**: the reconnect delay (retry logic only), test code.

use std::fs;
use std::path::Path;

use architectural_enforcement::{production_lines, rust_sources};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - The reconnect delay in retry logic");
        eprintln!("  - Test code (#[cfg(test)] modules)");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep to 'wait' for socket events (use the event channel!)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// The scan must actually see the crates it polices
#[test]
fn test_scan_covers_commentary_sources() {
    let sources = rust_sources("commentary");
    assert!(
        sources.iter().any(|p| p.ends_with("connection/driver.rs")),
        "commentary sources not found under the workspace root"
    );
}

fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();
    for path in rust_sources("commentary") {
        check_file(&path, &mut violations);
    }
    violations
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let lines = production_lines(&content);

    for (idx, line) in lines.iter().enumerate() {
        // Skip comments
        let code_part = line.split("//").next().unwrap_or(line);

        if !(code_part.contains("::sleep(") || code_part.contains(".sleep(")) {
            continue;
        }
        if is_retry_context(&lines, idx) {
            continue;
        }

        violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
    }
}

/// Sleep inside a function that schedules a reconnect
fn is_retry_context(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(5)..=current_idx;

    lines[context_range].iter().any(|line| {
        let line = line.to_lowercase();
        line.contains("retry") || line.contains("reconnect") || line.contains("backoff")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_sleep_is_flagged() {
        let code = vec![
            "async fn poll() {",
            "    loop {",
            "        tokio::time::sleep(Duration::from_millis(10)).await;",
            "    }",
            "}",
        ];
        assert!(!is_retry_context(&code, 2));
    }

    #[test]
    fn test_retry_delay_is_allowed() {
        let code = vec![
            "/// Wait out the backoff, then restart the handshake",
            "pub(super) async fn retry_after(shared: Arc<Shared>, generation: u64, delay: Duration) {",
            "    tokio::time::sleep(delay).await;",
            "}",
        ];
        assert!(is_retry_context(&code, 2));
    }
}
