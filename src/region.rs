// A wrapper around the SDK's `Region` to avoid exposing it in the API.

use std::{borrow::Cow, convert::Infallible, fmt, str::FromStr};

// Use `Region` from `aws_sdk_sts` to avoid depending directly on `aws_types`.
use aws_sdk_sts::config::Region as SdkRegion;

/// The region used for STS when none is configured.
pub(crate) const DEFAULT_REGION: &str = "us-east-1";

/// An AWS region.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Region(pub(crate) SdkRegion);

impl Region {
    /// Construct a new `Region` for the given string.
    pub fn new(region: impl Into<Cow<'static, str>>) -> Self {
        Self(SdkRegion::new(region))
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

impl FromStr for Region {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.to_string()))
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl serde::Serialize for Region {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl<'de> serde::Deserialize<'de> for Region {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let region = String::deserialize(deserializer)?;
        Ok(Self::new(region))
    }
}
