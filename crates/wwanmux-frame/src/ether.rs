//! Ethernet constants and hardware addresses.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;

use crate::error::FrameError;

/// Octets in one Ethernet address.
pub const ETH_ALEN: usize = 6;

/// Plain Ethernet header: destination + source + ethertype.
pub const ETH_HLEN: usize = 14;

/// Ethernet header carrying an in-band 802.1Q tag.
pub const VLAN_ETH_HLEN: usize = 18;

/// Offset of the ethertype field in an Ethernet header.
pub const ETHERTYPE_OFFSET: usize = 12;

/// IPv4 ethertype.
pub const ETH_P_IP: u16 = 0x0800;

/// IPv6 ethertype.
pub const ETH_P_IPV6: u16 = 0x86DD;

/// 802.1Q VLAN ethertype.
pub const ETH_P_8021Q: u16 = 0x8100;

/// Generic 802.3 marker used for anything that is not IP.
pub const ETH_P_802_3: u16 = 0x0001;

/// Mask of the VLAN id inside an 802.1Q TCI.
pub const VLAN_VID_MASK: u16 = 0x0FFF;

/// A 48-bit Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; ETH_ALEN]);

impl MacAddr {
    /// The all-zero address.
    pub const ZERO: MacAddr = MacAddr([0; ETH_ALEN]);

    /// Random unicast, locally administered address.
    pub fn random() -> Self {
        let mut octets = [0u8; ETH_ALEN];
        rand::thread_rng().fill_bytes(&mut octets);
        octets[0] &= 0xFE; // clear multicast
        octets[0] |= 0x02; // set local assignment
        Self(octets)
    }

    pub fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; ETH_ALEN]
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// True for a non-zero unicast address.
    pub fn is_valid_unicast(&self) -> bool {
        !self.is_zero() && !self.is_multicast()
    }

    /// Same address with the low bit of the last octet flipped.
    pub fn with_low_bit_flipped(&self) -> Self {
        let mut octets = self.0;
        octets[ETH_ALEN - 1] ^= 0x01;
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl FromStr for MacAddr {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; ETH_ALEN];
        let mut parts = s.split([':', '-']);
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|part| part.len() == 2)
                .ok_or_else(|| FrameError::InvalidMac(s.to_string()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| FrameError::InvalidMac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(FrameError::InvalidMac(s.to_string()));
        }
        Ok(Self(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_is_local_unicast() {
        for _ in 0..32 {
            let mac = MacAddr::random();
            assert!(!mac.is_multicast());
            assert_eq!(mac.0[0] & 0x02, 0x02);
            assert!(mac.is_valid_unicast());
        }
    }

    #[test]
    fn low_bit_flip_only_touches_last_octet() {
        let mac = MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x54]);
        let flipped = mac.with_low_bit_flipped();
        assert_eq!(flipped.0, [0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(flipped.with_low_bit_flipped(), mac);
    }

    #[test]
    fn parse_and_display() {
        let mac: MacAddr = "02:00:5e:10:00:01".parse().unwrap();
        assert_eq!(mac.0, [0x02, 0x00, 0x5e, 0x10, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "02:00:5e:10:00:01");

        let dashed: MacAddr = "02-00-5E-10-00-01".parse().unwrap();
        assert_eq!(dashed, mac);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("02:00:5e:10:00".parse::<MacAddr>().is_err());
        assert!("02:00:5e:10:00:01:02".parse::<MacAddr>().is_err());
        assert!("zz:00:5e:10:00:01".parse::<MacAddr>().is_err());
        assert!("2:00:5e:10:00:01".parse::<MacAddr>().is_err());
    }

    #[test]
    fn multicast_detection() {
        assert!(MacAddr([0x01, 0, 0x5e, 0, 0, 1]).is_multicast());
        assert!(!MacAddr::ZERO.is_valid_unicast());
    }
}
