//! Optical channel selection commands.
//!
//! The filter/illumination selector takes one ASCII command per switch:
//! `CHAN:<index>\r\n`.

use std::fmt;
use std::str::FromStr;

use crate::error::RigError;

/// Optical channels in selector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpticalChannel {
    /// DAPI, index 0.
    Dapi,
    /// GFP, index 1.
    Gfp,
    /// RFP, index 2.
    Rfp,
    /// Texas Red, index 3.
    TxRed,
    /// Transmitted light, index 4.
    Trans,
}

impl OpticalChannel {
    /// All channels in index order.
    pub const ALL: [OpticalChannel; 5] = [
        OpticalChannel::Dapi,
        OpticalChannel::Gfp,
        OpticalChannel::Rfp,
        OpticalChannel::TxRed,
        OpticalChannel::Trans,
    ];

    /// Selector position.
    pub fn index(self) -> usize {
        match self {
            OpticalChannel::Dapi => 0,
            OpticalChannel::Gfp => 1,
            OpticalChannel::Rfp => 2,
            OpticalChannel::TxRed => 3,
            OpticalChannel::Trans => 4,
        }
    }

    /// Operator-facing label.
    pub fn label(self) -> &'static str {
        match self {
            OpticalChannel::Dapi => "DAPI",
            OpticalChannel::Gfp => "GFP",
            OpticalChannel::Rfp => "RFP",
            OpticalChannel::TxRed => "TX RED",
            OpticalChannel::Trans => "Trans",
        }
    }

    /// Channel at `index`, or [`RigError::UnknownChannel`].
    pub fn from_index(index: usize) -> Result<Self, RigError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(RigError::UnknownChannel(index))
    }

    /// Command that switches the selector to this channel.
    pub fn command(self) -> Vec<u8> {
        channel_command(self.index())
    }
}

impl fmt::Display for OpticalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OpticalChannel {
    type Err = String;

    /// Accepts labels case-insensitively (`"tx red"`, `"TXRED"`) or an index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        if let Ok(index) = wanted.parse::<usize>() {
            return Self::from_index(index).map_err(|e| e.to_string());
        }
        Self::ALL
            .into_iter()
            .find(|channel| channel.label().replace(' ', "").to_ascii_uppercase() == wanted)
            .ok_or_else(|| format!("unknown optical channel '{s}'"))
    }
}

/// `CHAN:<index>\r\n` as bytes.
pub fn channel_command(index: usize) -> Vec<u8> {
    format!("CHAN:{index}\r\n").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_uses_crlf() {
        assert_eq!(channel_command(3), b"CHAN:3\r\n".to_vec());
        assert_eq!(OpticalChannel::Gfp.command(), b"CHAN:1\r\n".to_vec());
    }

    #[test]
    fn indices_follow_selector_order() {
        for (i, channel) in OpticalChannel::ALL.into_iter().enumerate() {
            assert_eq!(channel.index(), i);
            assert_eq!(OpticalChannel::from_index(i).unwrap(), channel);
        }
        assert!(matches!(
            OpticalChannel::from_index(5),
            Err(RigError::UnknownChannel(5))
        ));
    }

    #[test]
    fn parses_labels_and_indices() {
        assert_eq!("tx red".parse(), Ok(OpticalChannel::TxRed));
        assert_eq!("TX_RED".parse(), Ok(OpticalChannel::TxRed));
        assert_eq!("dapi".parse(), Ok(OpticalChannel::Dapi));
        assert_eq!("4".parse(), Ok(OpticalChannel::Trans));
        assert!("cy5".parse::<OpticalChannel>().is_err());
    }
}
