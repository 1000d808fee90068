/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;

use pdftrans::app_config::{Config, LogLevel, ServiceSelection};
use pdftrans::layout::DualLayout;
use pdftrans::translation::PipelineOptions;

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "zh");
    assert_eq!(config.translation.backend, "ollama");
    assert_eq!(config.translation.common.thread_count, 4);
    assert_eq!(config.jobs.max_concurrent_jobs, 2);
    assert_eq!(config.layout.dual_layout, DualLayout::Interleaved);
    assert!(config.layout.subset_fonts);
    assert_eq!(config.log_level, LogLevel::Info);

    let ollama = config.translation.backend_config("ollama");
    assert_eq!(ollama.endpoint, "http://localhost:11434");
    assert!(ollama.capabilities().max_in_flight >= 1);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.source_language = "xyz".to_string();
    assert!(config.validate().is_err());
    config.source_language = "en".to_string();

    config.translation.backend = "babelfish".to_string();
    assert!(config.validate().is_err());

    // Hosted backends need a key
    config.translation.backend = "deepl".to_string();
    assert!(config.validate().is_err());
    config.translation.backend = "ollama:gemma2:9b".to_string();
    assert!(config.validate().is_ok());

    config.translation.common.thread_count = 0;
    assert!(config.validate().is_err());
    config.translation.common.thread_count = 4;

    config.layout.min_font_scale = 1.5;
    assert!(config.validate().is_err());
    config.layout.min_font_scale = 0.6;

    config.notation.inline_patterns.push("(".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_serviceSelection_shouldRoundTripThroughDisplay() {
    let selection = ServiceSelection::parse(" OpenAI:gpt-4o-mini ").unwrap();
    assert_eq!(selection.backend, "openai");
    assert_eq!(selection.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(selection.to_string(), "openai:gpt-4o-mini");
    assert!(ServiceSelection::parse(":model").is_err());
}

#[test]
fn test_settingsFor_withModelInServiceString_shouldOverrideConfiguredModel() {
    let config = Config::default();
    let selection = ServiceSelection::parse("ollama:qwen2.5").unwrap();

    let settings = config
        .translation
        .settings_for(&selection, config.backend_options())
        .unwrap();

    assert_eq!(settings.name, "ollama");
    assert_eq!(settings.model, "qwen2.5");
}

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path)?;
    assert!(path.exists());

    let reloaded = Config::load_or_create(&path)?;
    assert_eq!(reloaded.translation.backend, created.translation.backend);
    assert_eq!(reloaded.target_language, created.target_language);
    Ok(())
}

#[test]
fn test_config_withPartialJson_shouldFillDefaults() -> Result<()> {
    let config: Config = serde_json::from_str(
        r#"{
            "source_language": "de",
            "target_language": "en",
            "layout": { "dual_layout": "side_by_side" },
            "log_level": "debug"
        }"#,
    )?;

    assert_eq!(config.layout.dual_layout, DualLayout::SideBySide);
    assert_eq!(config.layout.min_font_scale, 0.6);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.cache.enabled);
    assert!(config.validate().is_ok());

    let options = PipelineOptions::from_config(&config);
    assert_eq!(options.source_language, "de");
    assert_eq!(options.dual_layout, DualLayout::SideBySide);
    Ok(())
}
