//! Region to delivery host resolution.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Data region a stack lives in.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Region {
  #[default]
  Us,
  Eu,
  Au,
  AzureNa,
  AzureEu,
  GcpNa,
  GcpEu,
}

impl Region {
  /// Delivery (CDN) host for this region.
  pub fn host(&self) -> &'static str {
    match self {
      Self::Us => "cdn.contentstack.io",
      Self::Eu => "eu-cdn.contentstack.com",
      Self::Au => "au-cdn.contentstack.com",
      Self::AzureNa => "azure-na-cdn.contentstack.com",
      Self::AzureEu => "azure-eu-cdn.contentstack.com",
      Self::GcpNa => "gcp-na-cdn.contentstack.com",
      Self::GcpEu => "gcp-eu-cdn.contentstack.com",
    }
  }
}

impl FromStr for Region {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().replace('-', "_").as_str() {
      "us" | "na" => Ok(Self::Us),
      "eu" => Ok(Self::Eu),
      "au" => Ok(Self::Au),
      "azure_na" => Ok(Self::AzureNa),
      "azure_eu" => Ok(Self::AzureEu),
      "gcp_na" => Ok(Self::GcpNa),
      "gcp_eu" => Ok(Self::GcpEu),
      other => Err(format!("unknown region '{}'", other)),
    }
  }
}

impl fmt::Display for Region {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Us => "us",
      Self::Eu => "eu",
      Self::Au => "au",
      Self::AzureNa => "azure_na",
      Self::AzureEu => "azure_eu",
      Self::GcpNa => "gcp_na",
      Self::GcpEu => "gcp_eu",
    };
    f.write_str(name)
  }
}

/// API base URL. An explicit host wins over the region's default.
pub fn base_url(region: Region, host: Option<&str>) -> String {
  let host = host
    .map(|h| {
      h.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
    })
    .filter(|h| !h.is_empty())
    .unwrap_or_else(|| region.host());
  format!("https://{}/v3", host)
}
