// Supported test framework result formats.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const MIME_XML: &str = "application/xml";
pub const MIME_JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkType {
    Junit,
    Nunit,
    Xunit,
    Testng,
    Robot,
    Cucumber,
    Behave,
}

impl FrameworkType {
    pub const ALL: [FrameworkType; 7] = [
        FrameworkType::Junit,
        FrameworkType::Nunit,
        FrameworkType::Xunit,
        FrameworkType::Testng,
        FrameworkType::Robot,
        FrameworkType::Cucumber,
        FrameworkType::Behave,
    ];

    /// Tag used in endpoint paths.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameworkType::Junit => "junit",
            FrameworkType::Nunit => "nunit",
            FrameworkType::Xunit => "xunit",
            FrameworkType::Testng => "testng",
            FrameworkType::Robot => "robot",
            FrameworkType::Cucumber => "cucumber",
            FrameworkType::Behave => "behave",
        }
    }

    /// File extension of the framework's result file.
    pub fn extension(self) -> &'static str {
        match self {
            FrameworkType::Cucumber | FrameworkType::Behave => "json",
            _ => "xml",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self.extension() {
            "json" => MIME_JSON,
            _ => MIME_XML,
        }
    }

    fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for FrameworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameworkType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnsupportedFramework {
                given: s.to_owned(),
                supported: Self::supported_list(),
            })
    }
}
