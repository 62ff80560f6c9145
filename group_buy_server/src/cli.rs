use std::{env, env::VarError};

/// There's no real CLI for the worker, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    const DISPLAY_ENVS: [&str; 19] = [
        "RUST_LOG",
        "GB_DATABASE_URL",
        "GB_MAX_CONNECTIONS",
        "GB_SWEEP_INTERVAL_SECS",
        "GB_SWEEP_BATCH_SIZE",
        "GB_UNPAID_TRADE_ORDER_TIMEOUT_MINS",
        "GB_VIRTUAL_COMPLETION_ENABLED",
        "GB_VIRTUAL_COMPLETION_LEAD_SECS",
        "GB_VIRTUAL_COMPLETION_MIN_PERCENT",
        "GB_NOTIFY_INTERVAL_SECS",
        "GB_NOTIFY_BATCH_SIZE",
        "GB_NOTIFY_MAX_RETRIES",
        "GB_NOTIFY_BASE_BACKOFF_SECS",
        "GB_NOTIFY_MAX_BACKOFF_SECS",
        "GB_NOTIFY_HTTP_TIMEOUT_SECS",
        "GB_NOTIFY_STALE_AFTER_SECS",
        "GB_LOCK_WAIT_MS",
        "GB_LOCK_LEASE_MS",
        "GB_EVENT_BUFFER_SIZE",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<38} {val:<15}");
    })
}
