//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration directly from the environment and the optional
//! TOML file without starting the service.

use std::io::{self, Write};

use crate::config::{self, ControlConfig, EffectiveConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&mut io::stdout().lock(), &cfg);
}

/// Print default config values (no env or file overrides) to stdout.
pub fn run_defaults() {
    let cfg = ControlConfig::default().effective_config();
    print_config(&mut io::stdout().lock(), &cfg);
}

/// Validate configuration for misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let cfg = config::load();
    let mut warnings = cfg.warnings.clone();

    if cfg.store == config::StoreBackend::File && cfg.store_dir.as_os_str().is_empty() {
        warnings.push(format!("{} is empty", config::ENV_STORE_DIR));
    }
    if tracing_subscriber::EnvFilter::try_new(&cfg.log_level).is_err() {
        warnings.push(format!(
            "{} is not a valid filter: {:?}",
            config::ENV_LOG_LEVEL,
            cfg.log_level
        ));
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        for w in &warnings {
            eprintln!("WARNING: {}", w);
        }
        1
    }
}

fn print_config(out: &mut impl Write, cfg: &EffectiveConfig) {
    let _ = writeln!(out, "{}={}", config::ENV_STORE, cfg.store);
    let _ = writeln!(out, "{}={}", config::ENV_STORE_DIR, cfg.store_dir);
    let _ = writeln!(out, "{}={}", config::ENV_SHUTDOWN_TIMEOUT, cfg.shutdown_timeout_secs);
    let _ = writeln!(out, "{}={}", config::ENV_LOG_LEVEL, cfg.log_level);
    let _ = writeln!(out, "{}={}", config::ENV_LOG_FORMAT, cfg.log_format);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_LOCK;

    fn clear_env() {
        for k in [
            config::ENV_STORE,
            config::ENV_STORE_DIR,
            config::ENV_SHUTDOWN_TIMEOUT,
            config::ENV_LOG_LEVEL,
            config::ENV_LOG_FORMAT,
            config::ENV_CONFIG_FILE,
        ] {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_validate_passes_with_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        assert_eq!(run_validate(), 0, "default config should pass validation");
    }

    #[test]
    fn test_validate_fails_on_fallback() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var(config::ENV_STORE, "postgres");
        assert_eq!(run_validate(), 1);
        clear_env();
    }

    #[test]
    fn test_validate_fails_on_bad_filter() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var(config::ENV_LOG_LEVEL, "query_control=loud");
        assert_eq!(run_validate(), 1);
        clear_env();
    }

    #[test]
    fn test_print_config_includes_all_fields() {
        let cfg = ControlConfig::default().effective_config();
        let mut buf = Vec::new();
        print_config(&mut buf, &cfg);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.contains("QUERY_CONTROL_STORE=memory"));
        assert!(text.contains("QUERY_CONTROL_SHUTDOWN_TIMEOUT=30"));
        assert!(text.contains("QUERY_CONTROL_LOG_FORMAT=json"));
    }
}
