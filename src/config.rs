use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::drift::ImpactRule;
use crate::output::ReportFormat;
use crate::remediation::PlatformTag;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub remediation: RemediationConfig,
    #[serde(default)]
    pub impact_rules: Vec<ImpactRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_format")]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// `auto`, or a platform tag such as `bash` or `powershell`.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Platform assumed for policy entries whose `fix` is a single template.
    #[serde(default = "default_bare_fix_platform")]
    pub bare_fix_platform: PlatformTag,
    /// Host OS name (lowercase) to the platform its guidance is written for.
    #[serde(default = "default_os_platforms")]
    pub os_platforms: BTreeMap<String, PlatformTag>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub format: Option<ReportFormat>,
    pub platform: Option<String>,
    pub log_level: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/drift-tool/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(format) = overrides.format {
            self.report.format = format;
        }
        if let Some(platform) = overrides.platform {
            self.remediation.platform = platform;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn default_template() -> String {
        let template = r#"[logging]
level = "info"
json = false

[report]
format = "text"

[remediation]
platform = "auto"
bare_fix_platform = "bash"

[remediation.os_platforms]
linux = "bash"
macos = "bash"
darwin = "bash"
windows = "powershell"

[[impact_rules]]
path_pattern = "PermitRootLogin"
severity = "High"

[[impact_rules]]
path_pattern = "services"
severity = "Medium"
kind_scope = "removed"
"#;
        template.to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            bare_fix_platform: default_bare_fix_platform(),
            os_platforms: default_os_platforms(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_format() -> ReportFormat {
    ReportFormat::Text
}

fn default_platform() -> String {
    "auto".to_string()
}

fn default_bare_fix_platform() -> PlatformTag {
    PlatformTag::new("bash")
}

fn default_os_platforms() -> BTreeMap<String, PlatformTag> {
    [
        ("linux", "bash"),
        ("macos", "bash"),
        ("darwin", "bash"),
        ("windows", "powershell"),
    ]
    .into_iter()
    .map(|(os, platform)| (os.to_string(), PlatformTag::new(platform)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigOverrides};
    use crate::drift::{DeltaKind, Severity};
    use crate::output::ReportFormat;
    use crate::remediation::PlatformTag;

    #[test]
    fn template_parses_into_config() {
        let config: Config = toml::from_str(&Config::default_template()).expect("parse template");
        assert_eq!(config.report.format, ReportFormat::Text);
        assert_eq!(config.impact_rules.len(), 2);
        assert_eq!(config.impact_rules[0].severity, Severity::High);
        assert_eq!(config.impact_rules[1].kind_scope, Some(DeltaKind::Removed));
        assert_eq!(
            config.remediation.os_platforms.get("windows"),
            Some(&PlatformTag::new("powershell"))
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load(Some(&dir.path().join("absent.toml"))).expect("load");
        assert!(config.impact_rules.is_empty());
        assert_eq!(config.remediation.platform, "auto");
    }

    #[test]
    fn overrides_replace_loaded_values() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            format: Some(ReportFormat::Json),
            platform: Some("powershell".to_string()),
            log_level: None,
        });
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.remediation.platform, "powershell");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn write_template_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/config.toml");
        Config::write_template(&path).expect("write");
        let loaded = Config::load(Some(&path)).expect("load");
        assert_eq!(loaded.impact_rules.len(), 2);
    }
}
