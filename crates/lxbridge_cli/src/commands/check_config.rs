//! Check-config command implementation.

use lxbridge_engine::BridgeConfig;
use std::path::Path;

/// Loads a bridge configuration from a JSON file and validates it.
pub fn load(path: &Path) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let config: BridgeConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Runs the check-config command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(path)?;

    println!("Configuration OK: {}", path.display());
    println!("  Controller:        {}", config.endpoint);
    println!("  User:              {}", config.credentials.username);
    println!("  Ack timeout:       {} ms", config.ack_timeout.as_millis());
    println!("  Reconnect delay:   {} ms", config.reconnect.delay.as_millis());
    println!(
        "  Counter flush:     {} ms",
        config.counter_flush_interval.as_millis()
    );
    println!("  Structure path:    {}", config.structure_path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"endpoint": {{"host": "10.0.0.2", "port": 8080}}, "ackTimeoutMs": 250}}"#
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.endpoint.port, 8080);
        assert_eq!(config.ack_timeout, Duration::from_millis(250));
        assert_eq!(config.reconnect.delay, Duration::from_secs(5));
    }

    #[test]
    fn load_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"endpoint": {{"host": ""}}}}"#).unwrap();
        assert!(load(file.path()).is_err());

        assert!(load(Path::new("/nonexistent/lxbridge.json")).is_err());
    }
}
