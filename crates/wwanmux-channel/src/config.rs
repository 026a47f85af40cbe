//! Static modem channel table.
//!
//! Element zero is always the flash channel. Control sessions 257-261 map to
//! dedicated pipe pairs; every IP-data session shares the IP MUX channel.

/// Number of transfer descriptors on the trace channel.
const TDS_TRACE: u32 = 32;
const DL_TRACE_BUF_SIZE: u32 = 8192;

const DL_FLASH_BUF_SIZE: u32 = 16 * 1024;
const DL_LOOPBACK_BUF_SIZE: u32 = 1024 * 1024;
const DL_AT_BUF_SIZE: u32 = 2048;
const DL_RPC_BUF_SIZE: u32 = 32 * 1024;
const DL_MBIM_BUF_SIZE: u32 = DL_RPC_BUF_SIZE;
const DL_MUX_LITE_BUF_SIZE: u32 = 2 * 1024;

const TDS_FLASH_DL: u32 = 3;
const TDS_FLASH_UL: u32 = 6;
const TDS_AT: u32 = 4;
const TDS_RPC: u32 = 4;
const TDS_MBIM: u32 = TDS_RPC;
const TDS_LOOPBACK: u32 = 11;
const TDS_MUX_LITE_UL: u32 = 800;
const TDS_MUX_LITE_DL: u32 = 1200;

/// IRQ accumulation backoff for the IP MUX channel (microseconds).
const ACC_BACKOFF_MUX_US: u32 = 1000;
const ACC_BACKOFF_OFF_US: u32 = 0;

/// Number of built-in channels reserved on top of the IP session count.
pub const RESERVED_CHANNELS: usize = MODEM_CHANNELS.len();

/// What a table entry is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Flash,
    Mbim,
    /// A control session bound to a fixed VLAN tag (RPC, AT, loopback, trace).
    Control(u16),
    /// Shared channel carrying every IP-data session.
    IpMux,
}

/// Pipe configuration of one modem channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ChannelConfig {
    pub role: ChannelRole,
    pub ul_pipe: u32,
    pub dl_pipe: u32,
    pub ul_nr_of_entries: u32,
    pub dl_nr_of_entries: u32,
    pub dl_buf_size: u32,
    pub accumulation_backoff_us: u32,
}

const fn entry(
    role: ChannelRole,
    ul_pipe: u32,
    dl_pipe: u32,
    ul_nr_of_entries: u32,
    dl_nr_of_entries: u32,
    dl_buf_size: u32,
) -> ChannelConfig {
    let accumulation_backoff_us = match role {
        ChannelRole::IpMux => ACC_BACKOFF_MUX_US,
        _ => ACC_BACKOFF_OFF_US,
    };
    ChannelConfig {
        role,
        ul_pipe,
        dl_pipe,
        ul_nr_of_entries,
        dl_nr_of_entries,
        dl_buf_size,
        accumulation_backoff_us,
    }
}

/// The modem channel table.
pub const MODEM_CHANNELS: [ChannelConfig; 8] = [
    entry(ChannelRole::Flash, 0, 1, TDS_FLASH_UL, TDS_FLASH_DL, DL_FLASH_BUF_SIZE),
    entry(ChannelRole::Mbim, 12, 13, TDS_MBIM, TDS_MBIM, DL_MBIM_BUF_SIZE),
    // RPC
    entry(ChannelRole::Control(257), 2, 3, TDS_RPC, TDS_RPC, DL_RPC_BUF_SIZE),
    // IAT0 / IAT1
    entry(ChannelRole::Control(258), 4, 5, TDS_AT, TDS_AT, DL_AT_BUF_SIZE),
    entry(ChannelRole::Control(259), 8, 9, TDS_AT, TDS_AT, DL_AT_BUF_SIZE),
    entry(ChannelRole::Control(260), 10, 11, TDS_LOOPBACK, TDS_LOOPBACK, DL_LOOPBACK_BUF_SIZE),
    entry(ChannelRole::Control(261), 6, 7, TDS_TRACE, TDS_TRACE, DL_TRACE_BUF_SIZE),
    entry(ChannelRole::IpMux, 0, 1, TDS_MUX_LITE_UL, TDS_MUX_LITE_DL, DL_MUX_LITE_BUF_SIZE),
];

/// Configuration of the channel at `index`, or `None` past the table end.
pub fn channel_config(index: usize) -> Option<ChannelConfig> {
    let config = MODEM_CHANNELS.get(index).copied();
    if config.is_none() {
        tracing::error!(index, size = MODEM_CHANNELS.len(), "channel index out of range");
    }
    config
}

/// Channel configuration serving `tag`.
///
/// Control tags without a dedicated entry and all IP-data tags fall back to
/// the IP MUX channel.
pub fn config_for_tag(tag: u16) -> ChannelConfig {
    MODEM_CHANNELS
        .iter()
        .copied()
        .find(|config| config.role == ChannelRole::Control(tag))
        .unwrap_or(MODEM_CHANNELS[MODEM_CHANNELS.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_is_first() {
        assert_eq!(channel_config(0).unwrap().role, ChannelRole::Flash);
    }

    #[test]
    fn out_of_range_index() {
        assert!(channel_config(RESERVED_CHANNELS).is_none());
    }

    #[test]
    fn only_ip_mux_accumulates() {
        for config in MODEM_CHANNELS {
            let expected = if config.role == ChannelRole::IpMux {
                1000
            } else {
                0
            };
            assert_eq!(config.accumulation_backoff_us, expected);
        }
    }

    #[test]
    fn tag_lookup() {
        assert_eq!(config_for_tag(258).dl_buf_size, 2048);
        assert_eq!(config_for_tag(261).ul_nr_of_entries, 32);
        assert_eq!(config_for_tag(5).role, ChannelRole::IpMux);
        assert_eq!(config_for_tag(400).role, ChannelRole::IpMux);
    }
}
