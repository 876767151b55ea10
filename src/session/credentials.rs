use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Speech provider credentials carried by `start_recording`
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

impl ProviderCredentials {
    pub fn is_complete(&self) -> bool {
        !self.app_id.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

// Secrets stay out of logs
impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("app_id", &self.app_id)
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Provider name plus its credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub provider: String,
    pub credentials: ProviderCredentials,
}

/// Read-only source of provider credentials
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn provider_settings(&self) -> Result<ProviderSettings>;
}

/// Credentials fixed at startup (config file or environment)
pub struct StaticCredentials {
    settings: ProviderSettings,
}

impl StaticCredentials {
    pub fn new(provider: impl Into<String>, credentials: ProviderCredentials) -> Self {
        Self {
            settings: ProviderSettings {
                provider: provider.into(),
                credentials,
            },
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for StaticCredentials {
    async fn provider_settings(&self) -> Result<ProviderSettings> {
        Ok(self.settings.clone())
    }
}

/// The persisted voice settings document, re-read on every use
///
/// Shape: `{ "enabled": true, "provider": "xunfei", "xunfei": { "appId": ..,
/// "apiKey": .., "apiSecret": .. } }`. Edits made by the settings screen
/// take effect at the next recording.
pub struct VoiceSettingsFile {
    path: PathBuf,
}

impl VoiceSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Extract provider settings from the document
    pub fn parse(document: &str) -> Result<ProviderSettings> {
        let value: Value =
            serde_json::from_str(document).context("Voice settings are not valid JSON")?;

        if !value.get("enabled").and_then(Value::as_bool).unwrap_or(false) {
            bail!("Voice service is not enabled");
        }

        let provider = value
            .get("provider")
            .and_then(Value::as_str)
            .unwrap_or("xunfei")
            .to_string();

        let section = value
            .get(&provider)
            .cloned()
            .with_context(|| format!("Voice settings have no section for provider {}", provider))?;
        let credentials: ProviderCredentials = serde_json::from_value(section)
            .with_context(|| format!("Invalid credentials for provider {}", provider))?;

        Ok(ProviderSettings {
            provider,
            credentials,
        })
    }
}

#[async_trait::async_trait]
impl CredentialStore for VoiceSettingsFile {
    async fn provider_settings(&self) -> Result<ProviderSettings> {
        let document = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read voice settings: {}", self.path.display()))?;

        let settings = Self::parse(&document)?;
        debug!(
            "Loaded {} credentials from {}",
            settings.provider,
            self.path.display()
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = ProviderCredentials {
            app_id: "app-1".to_string(),
            api_key: "key-secret".to_string(),
            api_secret: String::new(),
        };

        let printed = format!("{:?}", credentials);
        assert!(printed.contains("app-1"));
        assert!(!printed.contains("key-secret"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("<empty>"));
    }

    #[test]
    fn test_credentials_use_camel_case_on_the_wire() {
        let credentials = ProviderCredentials {
            app_id: "a".to_string(),
            api_key: "b".to_string(),
            api_secret: "c".to_string(),
        };

        let value = serde_json::to_value(&credentials).unwrap();
        assert_eq!(value["appId"], "a");
        assert_eq!(value["apiKey"], "b");
        assert_eq!(value["apiSecret"], "c");
        assert!(credentials.is_complete());
    }

    #[test]
    fn test_parse_settings_document() -> Result<()> {
        let document = r#"{
            "enabled": true,
            "provider": "xunfei",
            "xunfei": { "appId": "app", "apiKey": "key", "apiSecret": "secret" }
        }"#;

        let settings = VoiceSettingsFile::parse(document)?;
        assert_eq!(settings.provider, "xunfei");
        assert_eq!(settings.credentials.app_id, "app");
        assert_eq!(settings.credentials.api_secret, "secret");

        Ok(())
    }

    #[test]
    fn test_parse_rejects_disabled_voice() {
        let document = r#"{ "enabled": false, "provider": "xunfei", "xunfei": {} }"#;
        assert!(VoiceSettingsFile::parse(document).is_err());
    }

    #[test]
    fn test_parse_requires_provider_section() {
        let document = r#"{ "enabled": true, "provider": "qwen" }"#;
        assert!(VoiceSettingsFile::parse(document).is_err());
    }

    #[tokio::test]
    async fn test_settings_file_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("voice.json");
        std::fs::write(
            &path,
            r#"{"enabled":true,"provider":"xunfei","xunfei":{"appId":"x","apiKey":"y","apiSecret":"z"}}"#,
        )?;

        let store = VoiceSettingsFile::new(&path);
        let settings = store.provider_settings().await?;
        assert_eq!(settings.credentials.api_key, "y");

        Ok(())
    }
}
