use std::{env, env::VarError};

/// The server takes no arguments. Any argument at all prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
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
    // MPG_GATEWAY_SECRET_KEY is deliberately absent
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "MPG_HOST",
        "MPG_PORT",
        "MPG_DATABASE_URL",
        "MPG_VENDOR_REGISTRY",
        "MPG_PROCESSING_FEE_RATE",
        "MPG_PROCESSING_FIXED_FEE",
        "MPG_PLATFORM_FEE_RATE",
        "MPG_FEE_BEARER_ID",
        "MPG_GATEWAY_BASE_URL",
        "MPG_GATEWAY_CALLBACK_URL",
        "MPG_GATEWAY_PREFERRED_BANK",
        "MPG_WEBHOOK_HMAC_CHECKS",
        "MPG_GATEWAY_IP_WHITELIST",
        "MPG_USE_X_FORWARDED_FOR",
        "MPG_USE_FORWARDED",
        "MPG_TERMINAL_CONFIRM_DELAY",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
