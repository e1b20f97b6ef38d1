//! Output formatting for the CLI.

use clap::ValueEnum;
use serde_json::{json, Value};
use session_lifecycle_coordinator::AuthState;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// JSON view of a state snapshot. Tokens are never printed.
pub fn state_json(state: &AuthState) -> Value {
    match state.user() {
        Some(user) => json!({
            "phase": state.phase(),
            "user_id": user.id,
            "profile": user.profile,
            "expires_at": state.session().and_then(|s| s.expires_at),
        }),
        None => json!({ "phase": state.phase() }),
    }
}

/// Print a state snapshot.
pub fn print_state(state: &AuthState, format: OutputFormat) {
    match format {
        OutputFormat::Text => match state.user() {
            Some(user) => {
                let name = user
                    .profile
                    .display_name
                    .as_deref()
                    .or(user.profile.handle.as_deref())
                    .unwrap_or(&user.id);
                println!("{}: {}", state.phase(), name);
                print_row("User ID", &user.id);
                if let Some(locale) = &user.profile.locale {
                    print_row("Language", locale);
                }
                if let Some(expires_at) = state.session().and_then(|s| s.expires_at) {
                    print_row("Expires", &expires_at.to_rfc3339());
                }
            }
            None => println!("{}", state.phase()),
        },
        OutputFormat::Json => println!("{}", state_json(state)),
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => {
            println!("{}", json!({ "status": "success", "message": message }));
        }
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => {
            eprintln!("{}", json!({ "status": "error", "message": message }));
        }
    }
}

fn print_row(label: &str, value: &str) {
    println!("  {:<12} {}", format!("{}:", label), value);
}
