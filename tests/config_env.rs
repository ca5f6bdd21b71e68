#![expect(clippy::expect_used, reason = "test assertions")]

//! Layered configuration flowing into gateway settings.

use std::time::Duration;

use figment::Jail;
use ortho_config::OrthoConfig;
use rstest::rstest;
use serial_test::serial;
use tla_web::{
    GatewaySettings,
    engine::Endpoint,
    server::{AppConfig, parse_bind_addr},
};

#[rstest]
#[serial]
fn environment_overrides_reach_gateway_settings() {
    Jail::expect_with(|j| {
        j.set_env("TLAWEB_ENGINE_ENDPOINT", "engine.internal:9001");
        j.set_env("TLAWEB_MAX_HEAVY_REQUESTS", "2");
        j.set_env("TLAWEB_RATE_LIMIT_MAX_REQUESTS", "5");
        j.set_env("TLAWEB_VERIFY_CACHE_TTL_MS", "250");
        j.set_env("TLAWEB_ENGINE_CALL_TIMEOUT_SECS", "7");
        let config = AppConfig::load_from_iter(["tla-web"]).expect("load");
        let settings = GatewaySettings::from_config(&config);
        assert_eq!(settings.engine_endpoint, Endpoint::new("engine.internal", 9001));
        assert_eq!(settings.max_heavy_requests, 2);
        assert_eq!(settings.rate_limit_max_requests, 5);
        assert_eq!(settings.verify_cache_ttl, Duration::from_millis(250));
        assert_eq!(settings.invoker.call_timeout, Duration::from_secs(7));
        Ok(())
    });
}

#[rstest]
#[serial]
fn loaded_defaults_match_built_in_defaults() {
    Jail::expect_with(|_j| {
        let config = AppConfig::load_from_iter(["tla-web"]).expect("load");
        let loaded = GatewaySettings::from_config(&config);
        let built_in = GatewaySettings::default();
        assert_eq!(loaded.engine_endpoint, built_in.engine_endpoint);
        assert_eq!(loaded.engine_service, built_in.engine_service);
        assert_eq!(loaded.rate_limit_window, built_in.rate_limit_window);
        assert_eq!(loaded.max_heavy_requests, built_in.max_heavy_requests);
        assert_eq!(loaded.check_max_steps, built_in.check_max_steps);
        assert_eq!(loaded.invariants_cache_ttl, built_in.invariants_cache_ttl);
        assert!(parse_bind_addr(&config.bind).is_ok());
        Ok(())
    });
}

#[rstest]
#[serial]
fn malformed_engine_endpoint_falls_back_to_default() {
    Jail::expect_with(|j| {
        j.set_env("TLAWEB_ENGINE_ENDPOINT", "not an endpoint");
        let config = AppConfig::load_from_iter(["tla-web"]).expect("load");
        let settings = GatewaySettings::from_config(&config);
        assert_eq!(settings.engine_endpoint, Endpoint::new("localhost", 8822));
        Ok(())
    });
}

#[rstest]
#[serial]
fn command_line_beats_environment() {
    Jail::expect_with(|j| {
        j.set_env("TLAWEB_CHECK_MAX_STEPS", "4");
        let config = AppConfig::load_from_iter(["tla-web", "--check-max-steps", "12"])
            .expect("load");
        assert_eq!(GatewaySettings::from_config(&config).check_max_steps, 12);
        Ok(())
    });
}
