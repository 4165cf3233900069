// SPDX-License-Identifier: MIT OR Apache-2.0

/// Peer-advertised encoder profile hint, ordered so the sender can take the
/// maximum across all channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    #[default]
    Default,
    Low,
    Medium,
    High,
}

impl Quality {
    /// Parses the `Quality` attribute value of a `<SuggestedQuality .../>`
    /// control document. Unrecognized names are rejected rather than
    /// defaulted, so a typo'd peer doesn't silently downgrade.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Default" => Some(Quality::Default),
            "Low" => Some(Quality::Low),
            "Medium" => Some(Quality::Medium),
            "High" => Some(Quality::High),
            _ => None,
        }
    }

    /// The literal `Quality` attribute value for this hint, the inverse of
    /// [`Quality::parse`].
    pub fn name(self) -> &'static str {
        match self {
            Quality::Default => "Default",
            Quality::Low => "Low",
            Quality::Medium => "Medium",
            Quality::High => "High",
        }
    }
}
