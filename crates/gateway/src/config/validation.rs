use terralens_common::config::SystemConfig;

/// Cross-field configuration checks. Fails with a message naming the
/// offending key.
pub fn validate(config: &SystemConfig) -> Result<(), String> {
    if config.registry.max_handles == 0 {
        return Err("registry.max_handles must be at least 1".into());
    }
    if config.registry.build_timeout_seconds == 0 {
        return Err("registry.build_timeout_seconds must be at least 1".into());
    }
    if config.registry.build_timeout_seconds >= config.registry.handle_ttl_seconds {
        return Err(
            "registry.build_timeout_seconds must be shorter than registry.handle_ttl_seconds"
                .into(),
        );
    }
    if config.registry.sweep_interval_seconds == 0 {
        return Err("registry.sweep_interval_seconds must be at least 1".into());
    }
    if !config.engine.base_url.starts_with("http://") && !config.engine.base_url.starts_with("https://")
    {
        return Err(format!(
            "engine.base_url must be an http(s) URL, got '{}'",
            config.engine.base_url
        ));
    }
    if config.engine.request_timeout_seconds == 0 {
        return Err("engine.request_timeout_seconds must be at least 1".into());
    }
    if config.engine.breaker.failure_threshold == 0 {
        return Err("engine.breaker.failure_threshold must be at least 1".into());
    }
    if config.limits.max_search_results == 0 {
        return Err("limits.max_search_results must be at least 1".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_validation() {
        assert!(validate(&SystemConfig::default()).is_ok());
    }

    #[test]
    fn test_build_timeout_must_undercut_ttl() {
        let mut config = SystemConfig::default();
        config.registry.handle_ttl_seconds = 60;
        config.registry.build_timeout_seconds = 60;
        let error = validate(&config).unwrap_err();
        assert!(error.contains("build_timeout_seconds"));
    }

    #[test]
    fn test_engine_url_scheme_is_checked() {
        let mut config = SystemConfig::default();
        config.engine.base_url = "localhost:9100".into();
        let error = validate(&config).unwrap_err();
        assert!(error.contains("engine.base_url"));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let mut config = SystemConfig::default();
        config.registry.max_handles = 0;
        assert!(validate(&config).is_err());
    }
}
