use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings from `cppstats-prepare.yaml`, after environment overrides.
///
/// Every field has a default, so an empty or partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareSettings {
    #[serde(default)]
    pub tools: ToolSettings,

    /// Seconds an external tool may run before it is killed; `0` waits forever.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Take a `.bak<N>` snapshot before every step.
    #[serde(default = "default_true")]
    pub backups: bool,

    #[serde(default)]
    pub lazy_preparation: bool,

    /// Reuse earlier results through symbolic links instead of copies.
    #[serde(default = "default_true")]
    pub prefer_links: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: Utf8PathBuf,

    #[serde(default)]
    pub debug_mode: bool,
}

impl PrepareSettings {
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }
}

impl Default for PrepareSettings {
    fn default() -> Self {
        Self {
            tools: ToolSettings::default(),
            tool_timeout_secs: default_tool_timeout_secs(),
            backups: true,
            lazy_preparation: false,
            prefer_links: true,
            log_dir: default_log_dir(),
            debug_mode: false,
        }
    }
}

/// External programs and their fixed arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_srcml")]
    pub srcml: String,

    #[serde(default = "default_xsltproc")]
    pub xsltproc: String,

    #[serde(default = "default_astyle")]
    pub astyle: String,

    #[serde(default = "default_srcml_language")]
    pub srcml_language: String,

    #[serde(default = "default_astyle_style")]
    pub astyle_style: String,

    /// Parser depth passed to xsltproc when the first attempt fails.
    #[serde(default = "default_xslt_max_parser_depth")]
    pub xslt_max_parser_depth: u32,

    /// Comment-stripping stylesheet; the bundled one is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_comments_xsl: Option<Utf8PathBuf>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            srcml: default_srcml(),
            xsltproc: default_xsltproc(),
            astyle: default_astyle(),
            srcml_language: default_srcml_language(),
            astyle_style: default_astyle_style(),
            xslt_max_parser_depth: default_xslt_max_parser_depth(),
            delete_comments_xsl: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_tool_timeout_secs() -> u64 {
    300
}

fn default_log_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("logs")
}

fn default_srcml() -> String {
    "srcml".to_string()
}

fn default_xsltproc() -> String {
    "xsltproc".to_string()
}

fn default_astyle() -> String {
    "astyle".to_string()
}

fn default_srcml_language() -> String {
    "C".to_string()
}

fn default_astyle_style() -> String {
    "java".to_string()
}

fn default_xslt_max_parser_depth() -> u32 {
    1024
}
