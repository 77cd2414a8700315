use serde::Deserialize;

/// Upper bound on how many replicas one checksum descriptor may expand to.
///
/// Some saves keep an independent checksum per slot at a fixed stride; a
/// definition asking for more than this is clamped, not rejected.
pub const MAX_CHECKSUM_INSTANCES: u32 = 64;

/// Checksum algorithm tag, resolved by the external checksum library.
///
/// The engine only carries these descriptors; it never computes checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Crc16,
    Crc32,
    /// Card-specific additive checksum (paired sum / inverted-sum words).
    AddInvDual,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Crc16 => "crc16",
            Self::Crc32 => "crc32",
            Self::AddInvDual => "addinvdual",
        };
        write!(f, "{}", name)
    }
}

/// One concrete checksum inside a save file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumDescriptor {
    pub algorithm: ChecksumAlgorithm,

    /// Algorithm parameter (e.g. CRC polynomial); `None` selects the
    /// library's default for the algorithm.
    pub param: Option<u32>,

    /// Byte address of the stored checksum value, relative to file start.
    pub address: u32,

    /// Start of the covered range, relative to file start.
    pub start: u32,

    /// Length of the covered range in bytes. Always non-zero for a
    /// descriptor accepted at load time.
    pub length: u32,
}

impl ChecksumDescriptor {
    /// Expand into `instances` replicas spaced `increment` bytes apart.
    ///
    /// An instance count of 0 or 1 yields the descriptor itself; counts
    /// above [`MAX_CHECKSUM_INSTANCES`] are clamped.
    pub fn replicate(&self, instances: u32, increment: u32) -> Vec<ChecksumDescriptor> {
        let count = instances.clamp(1, MAX_CHECKSUM_INSTANCES);

        (0..count)
            .map(|i| {
                let shift = i * increment;
                ChecksumDescriptor {
                    address: self.address + shift,
                    start: self.start + shift,
                    ..self.clone()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crc16_at(address: u32) -> ChecksumDescriptor {
        ChecksumDescriptor {
            algorithm: ChecksumAlgorithm::Crc16,
            param: Some(0x8005),
            address,
            start: 0x40,
            length: 0x1f80,
        }
    }

    #[test]
    fn test_replicate_single_instance_is_identity() {
        let desc = crc16_at(0x10);
        assert_eq!(desc.replicate(0, 0x2000), vec![desc.clone()]);
        assert_eq!(desc.replicate(1, 0x2000), vec![desc]);
    }

    #[test]
    fn test_replicate_applies_increment_to_address_and_start() {
        let replicas = crc16_at(0x10).replicate(3, 0x2000);

        assert_eq!(replicas.len(), 3);
        assert_eq!(replicas[1].address, 0x2010);
        assert_eq!(replicas[1].start, 0x2040);
        assert_eq!(replicas[2].address, 0x4010);
        // Range length and parameters are shared by every replica.
        assert!(replicas.iter().all(|r| r.length == 0x1f80));
        assert!(replicas.iter().all(|r| r.param == Some(0x8005)));
    }

    #[test]
    fn test_replicate_clamps_instance_count() {
        let replicas = crc16_at(0).replicate(10_000, 4);
        assert_eq!(replicas.len(), MAX_CHECKSUM_INSTANCES as usize);
    }
}
