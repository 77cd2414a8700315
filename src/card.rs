use std::io;

/// Block size of a GameCube memory card, in bytes.
pub const GCN_BLOCK_SIZE: usize = 8192;

/// Reserved system blocks at the start of a GameCube card (header,
/// directory x2, block table x2).
pub const GCN_SYSTEM_BLOCKS: usize = 5;

/// Where the 64-byte comment region splits into its two descriptions.
///
/// Card kinds differ in layout, so this is a capability reported once per
/// card rather than re-derived per block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentRegionLayout {
    /// Bytes of "game description" text at the start of the region.
    pub game_desc_len: usize,
    /// Bytes of "file description" text immediately after it.
    pub file_desc_len: usize,
}

impl CommentRegionLayout {
    pub fn total_len(&self) -> usize {
        self.game_desc_len + self.file_desc_len
    }
}

impl Default for CommentRegionLayout {
    fn default() -> Self {
        Self {
            game_desc_len: 32,
            file_desc_len: 32,
        }
    }
}

/// Read-only view of a memory card image.
///
/// The engine never writes through this interface; reconstruction output is
/// delivered as [`SyntheticEntry`](crate::types::SyntheticEntry) values for
/// the caller to apply.
pub trait Card: Send + Sync {
    /// Size of one allocation block in bytes.
    fn block_size(&self) -> usize;

    /// Total number of blocks, including reserved system blocks.
    fn total_blocks(&self) -> usize;

    /// Number of reserved system blocks at the start of the card.
    fn system_block_count(&self) -> usize;

    /// The card's own allocation state, one flag per block.
    fn used_block_bitmap(&self) -> Vec<bool>;

    /// Read one block's raw contents.
    fn read_block(&self, block: usize) -> io::Result<Vec<u8>>;

    /// Comment-region layout for this card kind.
    fn comment_region_layout(&self) -> CommentRegionLayout {
        CommentRegionLayout::default()
    }
}

/// In-memory card backed by a raw image buffer.
#[derive(Debug, Clone)]
pub struct ImageCard {
    data: Vec<u8>,
    block_size: usize,
    system_blocks: usize,
    bitmap: Vec<bool>,
}

impl ImageCard {
    /// Wrap a raw image. The buffer length must be a whole number of blocks.
    pub fn new(data: Vec<u8>, block_size: usize, system_blocks: usize) -> io::Result<Self> {
        if block_size == 0 || data.len() % block_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "image length {} is not a multiple of block size {}",
                    data.len(),
                    block_size
                ),
            ));
        }

        let total = data.len() / block_size;
        let mut bitmap = vec![false; total];
        for flag in bitmap.iter_mut().take(system_blocks) {
            *flag = true;
        }

        Ok(Self {
            data,
            block_size,
            system_blocks,
            bitmap,
        })
    }

    /// Blank card of `total_blocks` zeroed blocks.
    pub fn blank(total_blocks: usize, block_size: usize, system_blocks: usize) -> Self {
        Self::new(vec![0; total_blocks * block_size], block_size, system_blocks)
            .expect("blank image is always block aligned")
    }

    /// Mark one block used in the card's bitmap.
    pub fn set_block_used(&mut self, block: usize, used: bool) {
        if let Some(flag) = self.bitmap.get_mut(block) {
            *flag = used;
        }
    }

    /// Overwrite one block's contents.
    pub fn write_block(&mut self, block: usize, contents: &[u8]) {
        let start = block * self.block_size;
        let len = contents.len().min(self.block_size);
        self.data[start..start + len].copy_from_slice(&contents[..len]);
    }
}

impl Card for ImageCard {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> usize {
        self.data.len() / self.block_size
    }

    fn system_block_count(&self) -> usize {
        self.system_blocks
    }

    fn used_block_bitmap(&self) -> Vec<bool> {
        self.bitmap.clone()
    }

    fn read_block(&self, block: usize) -> io::Result<Vec<u8>> {
        let start = block
            .checked_mul(self.block_size)
            .filter(|&s| s + self.block_size <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("block {} is out of range", block),
                )
            })?;

        Ok(self.data[start..start + self.block_size].to_vec())
    }
}
