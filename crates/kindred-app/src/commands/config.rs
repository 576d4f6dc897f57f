use anyhow::Result;

use kindred_core::config::redact;
use kindred_core::Config;

pub fn run() -> Result<()> {
    match Config::config_path() {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (no config directory)"),
    }

    let (config, validation) = match Config::load() {
        Ok(loaded) => loaded,
        Err(e) => anyhow::bail!("{}\n{}", e, e.user_message()),
    };

    println!("Google API key:  {}", redact(&config.google.api_key));
    println!("Client id:       {}", redact(&config.google.client_id));
    println!("Calendar:        {}", config.google.calendar_id);
    println!("Scopes:          {}", config.google.scope());
    println!(
        "Weekly reports:  {}",
        if config.email.is_configured() {
            format!("to {}", config.email.to_email)
        } else {
            "disabled".to_string()
        }
    );

    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }
    println!("Configuration OK");
    Ok(())
}
