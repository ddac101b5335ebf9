use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Which webmail client a code was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodeSource {
    Gmail,
    Outlook,
    Yahoo,
    #[default]
    Unknown,
}

impl CodeSource {
    /// Classify a page URL by webmail host.
    pub fn from_url(url: &str) -> CodeSource {
        match Url::parse(url) {
            Ok(parsed) => parsed
                .host_str()
                .map(CodeSource::from_host)
                .unwrap_or(CodeSource::Unknown),
            Err(_) => CodeSource::Unknown,
        }
    }

    pub fn from_host(host: &str) -> CodeSource {
        let host = host.to_lowercase();
        if host.contains("mail.google.com") {
            CodeSource::Gmail
        } else if host.contains("outlook") {
            CodeSource::Outlook
        } else if host.contains("mail.yahoo.com") {
            CodeSource::Yahoo
        } else {
            CodeSource::Unknown
        }
    }
}

impl fmt::Display for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodeSource::Gmail => "gmail",
            CodeSource::Outlook => "outlook",
            CodeSource::Yahoo => "yahoo",
            CodeSource::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}
