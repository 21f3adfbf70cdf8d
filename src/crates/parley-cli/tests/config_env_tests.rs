//! `PARLEY_*` overrides. Kept in its own test binary so no other test
//! observes the process environment it sets.

use llm::Provider;
use parley_cli::ParleyConfig;
use std::path::PathBuf;

#[test]
fn test_environment_overrides() {
    let mut config = ParleyConfig::from_toml_str(
        r#"
        [llm]
        provider = "deepseek"
        model = "deepseek-reasoner"
        base_url = "http://deepseek.internal/v1"

        [[tools.servers]]
        name = "pubmed"
        url = "http://localhost:8000/mcp"

        [[tools.servers]]
        name = "medrxiv"
        url = "http://localhost:8002/mcp"
        "#,
    )
    .unwrap();

    std::env::set_var("PARLEY_DATABASE", "/tmp/parley-env.db");
    std::env::set_var("PARLEY_LLM_PROVIDER", "groq");
    std::env::set_var("PARLEY_MCP_URL", "http://localhost:8001/mcp");
    config.apply_env_overrides().unwrap();

    assert_eq!(config.database.path, PathBuf::from("/tmp/parley-env.db"));
    assert_eq!(config.llm.provider, Provider::Groq);
    // deepseek-specific settings are dropped with the provider switch
    assert_eq!(config.llm.model_name(), "llama-3.1-8b-instant");
    assert_eq!(config.llm.base_url, None);
    assert_eq!(config.tools.servers.len(), 1);
    assert_eq!(config.tools.servers[0].url, "http://localhost:8001/mcp");

    std::env::set_var("PARLEY_LLM_MODEL", "llama-3.3-70b-versatile");
    config.apply_env_overrides().unwrap();
    assert_eq!(config.llm.model_name(), "llama-3.3-70b-versatile");

    std::env::set_var("PARLEY_LLM_PROVIDER", "anthropic");
    assert!(config.apply_env_overrides().is_err());

    for key in [
        "PARLEY_DATABASE",
        "PARLEY_LLM_PROVIDER",
        "PARLEY_LLM_MODEL",
        "PARLEY_MCP_URL",
    ] {
        std::env::remove_var(key);
    }
}
