use wwanmux_frame::{MacAddr, DATA_TAG_END, MAX_MTU, MIN_MTU};

use crate::error::{MuxError, Result};

const DEFAULT_NAME: &str = "wwan0";
const DEFAULT_MAX_SESSIONS: usize = 8;
const DEFAULT_MTU: usize = 1500;

/// Root device configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Interface name reported to the host stack.
    pub name: String,
    /// Maximum number of IP-capable sessions. Default: 8.
    pub max_sessions: usize,
    /// Initial MTU. Default: 1500.
    pub mtu: usize,
    /// Fixed hardware address. A random locally administered address is
    /// generated when unset.
    pub mac_address: Option<String>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            mtu: DEFAULT_MTU,
            mac_address: None,
        }
    }
}

impl MuxConfig {
    /// Parse a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| MuxError::InvalidConfig(err.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MuxError::InvalidConfig(
                "device name must not be empty".to_string(),
            ));
        }
        if self.max_sessions == 0 || self.max_sessions > usize::from(DATA_TAG_END) {
            return Err(MuxError::InvalidConfig(format!(
                "max_sessions must be in 1..={DATA_TAG_END}, got {}",
                self.max_sessions
            )));
        }
        check_mtu(self.mtu)?;
        self.parsed_mac()?;
        Ok(())
    }

    /// The configured hardware address, if any.
    pub fn parsed_mac(&self) -> Result<Option<MacAddr>> {
        let Some(raw) = self.mac_address.as_deref() else {
            return Ok(None);
        };
        let mac: MacAddr = raw
            .parse()
            .map_err(|err| MuxError::InvalidConfig(format!("mac_address: {err}")))?;
        if !mac.is_valid_unicast() {
            return Err(MuxError::InvalidAddress(mac));
        }
        Ok(Some(mac))
    }
}

pub(crate) fn check_mtu(mtu: usize) -> Result<()> {
    if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Err(MuxError::OutOfRange {
            mtu,
            min: MIN_MTU,
            max: MAX_MTU,
        });
    }
    Ok(())
}
