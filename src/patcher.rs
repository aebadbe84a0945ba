//! Quantity patching for the object placement inventory
//!
//! The game stores one quantity slot per placeable object type in
//! `PBP_ObjectPlacementInventory.uexp`. Each slot follows a serialized
//! `Quantity` IntProperty tag, so the slots are found by searching for that
//! tag rather than relying on fixed offsets. All slots are kept at the same
//! value.
//!
//! The 2-byte value codec is reverse-engineered from files written by earlier
//! tools and is kept bit-for-bit compatible with them. It is not a plain
//! little-endian encoding: see [`decode_quantity`] and [`encode_quantity`].
//!
//! # Examples
//!
//! ```no_run
//! use sessionmm::{GamePaths, QuantityPatcher};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let paths = GamePaths::new("/games/Session");
//! let patcher = QuantityPatcher::new(sessionmm::config::DEFAULT_QUANTITY_MARKER)?;
//!
//! let file = paths.object_placement_file();
//! println!("Current count: {}", patcher.get_object_count(&file)?);
//! patcher.set_object_count(&file, "250")?;
//! # Ok(())
//! # }
//! ```

use crate::config::PatchConfig;
use crate::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Width of a quantity slot in bytes
pub const QUANTITY_WIDTH: usize = 2;

/// Largest object count accepted by [`QuantityPatcher::set_object_count`]
pub const MAX_OBJECT_COUNT: u32 = 65535;

/// Every address holding one logical quantity, with the values read from them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityField {
    pub offsets: Vec<usize>,
    pub values: Vec<u32>,
}

impl QuantityField {
    /// All addresses hold the same value
    pub fn is_consistent(&self) -> bool {
        self.values.windows(2).all(|w| w[0] == w[1])
    }

    /// Value at the lowest address
    pub fn primary_value(&self) -> Option<u32> {
        self.offsets
            .iter()
            .zip(&self.values)
            .min_by_key(|(offset, _)| **offset)
            .map(|(_, value)| *value)
    }
}

/// Every non-overlapping occurrence of `marker` in `bytes`, as the offset
/// just past the match.
///
/// Matches are searched from the end of the data toward the start, so the
/// returned offsets are in descending order.
pub fn find_quantity_addresses(bytes: &[u8], marker: &[u8]) -> Vec<usize> {
    let m = marker.len();
    let mut addresses = Vec::new();

    if m == 0 || bytes.len() < m {
        return addresses;
    }

    let mut pos = bytes.len() - m;
    loop {
        if &bytes[pos..pos + m] == marker {
            addresses.push(pos + m);
            if pos < m {
                break;
            }
            pos -= m;
        } else {
            if pos == 0 {
                break;
            }
            pos -= 1;
        }
    }

    addresses
}

/// Decode the two bytes of a quantity slot.
///
/// - second byte `0`: the value is the first byte alone
/// - second byte below `16`: the bytes are swapped and read big-endian
/// - otherwise: the bytes are read big-endian as stored
pub fn decode_quantity(first: u8, second: u8) -> u32 {
    let (high, low) = if second == 0 {
        (0, first)
    } else if second < 16 {
        (second, first)
    } else {
        (first, second)
    };
    (u32::from(high) << 8) | u32::from(low)
}

/// Encode a value into the two bytes written to a quantity slot.
///
/// The value's uppercase hex digits are split into bytes (left-padded to an
/// even length). Values with exactly three hex digits have their two bytes
/// swapped, and single-byte values are followed by `0x00`.
pub fn encode_quantity(value: u16) -> [u8; QUANTITY_WIDTH] {
    let hex_value = format!("{:X}", value);
    let [high, low] = value.to_be_bytes();

    let mut bytes: Vec<u8> = if high == 0 { vec![low] } else { vec![high, low] };

    if hex_value.len() == 3 {
        bytes.swap(0, 1);
    }

    [bytes[0], bytes.get(1).copied().unwrap_or(0x00)]
}

/// Sibling path the unpatched file is copied to before the first patch
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Read the quantity stored at `offset`
pub fn read_quantity<P: AsRef<Path>>(path: P, offset: usize) -> Result<u32> {
    let bytes = fs::read(path.as_ref())?;
    quantity_at(&bytes, offset)
}

fn quantity_at(bytes: &[u8], offset: usize) -> Result<u32> {
    match slot_end(offset).and_then(|end| bytes.get(offset..end)) {
        Some(slot) => Ok(decode_quantity(slot[0], slot[1])),
        None => Err(Error::PatchFailure(format!(
            "Offset {} is outside the file ({} bytes)",
            offset,
            bytes.len()
        ))),
    }
}

/// Locates and rewrites quantity slots in a binary file
#[derive(Debug, Clone)]
pub struct QuantityPatcher {
    marker: Vec<u8>,
    atomic_writes: bool,
}

impl QuantityPatcher {
    /// Patcher searching for the hex-encoded `marker`
    pub fn new(marker: &str) -> Result<Self> {
        Self::from_config(&PatchConfig {
            quantity_marker: marker.to_string(),
            atomic_writes: false,
        })
    }

    pub fn from_config(config: &PatchConfig) -> Result<Self> {
        Ok(Self {
            marker: config.marker_bytes()?,
            atomic_writes: config.atomic_writes,
        })
    }

    /// Write the whole patched file through a temp file and rename
    pub fn atomic(mut self, atomic_writes: bool) -> Self {
        self.atomic_writes = atomic_writes;
        self
    }

    pub fn marker(&self) -> &[u8] {
        &self.marker
    }

    /// Quantity addresses in `path`; slots running past the end of the file are dropped
    pub fn find_addresses<P: AsRef<Path>>(&self, path: P) -> Result<Vec<usize>> {
        let path = path.as_ref();
        let bytes = read_target(path)?;
        let addresses = find_quantity_addresses(&bytes, &self.marker)
            .into_iter()
            .filter(|&address| {
                let fits = address + QUANTITY_WIDTH <= bytes.len();
                if !fits {
                    tracing::debug!("Ignoring truncated quantity slot at {}", address);
                }
                fits
            })
            .collect();
        Ok(addresses)
    }

    /// Every quantity address in `path` with its current value
    pub fn inspect<P: AsRef<Path>>(&self, path: P) -> Result<QuantityField> {
        let path = path.as_ref();
        let offsets = self.find_addresses(path)?;
        let bytes = fs::read(path)?;
        let values = offsets
            .iter()
            .map(|&offset| quantity_at(&bytes, offset))
            .collect::<Result<Vec<_>>>()?;
        Ok(QuantityField { offsets, values })
    }

    /// Write `value` at every offset in `offsets`.
    ///
    /// An empty `offsets` list is refused and the file is left untouched.
    /// The first successful call for a file leaves a `.bak` copy of the
    /// unpatched file next to it.
    pub fn write_quantity<P: AsRef<Path>>(
        &self,
        path: P,
        offsets: &[usize],
        value: u16,
    ) -> Result<()> {
        let path = path.as_ref();

        if offsets.is_empty() {
            return Err(Error::PatchFailure(format!(
                "No quantity addresses to write in {}",
                path.display()
            )));
        }

        let len = fs::metadata(path)
            .map_err(|_| Error::NotFound(format!("File not found: {}", path.display())))?
            .len() as usize;
        if let Some(bad) = offsets
            .iter()
            .find(|&&o| slot_end(o).map_or(true, |end| end > len))
        {
            return Err(Error::PatchFailure(format!(
                "Offset {} is outside {} ({} bytes)",
                bad,
                path.display(),
                len
            )));
        }

        let backup = backup_path(path);
        if !backup.exists() {
            fs::copy(path, &backup)?;
            tracing::info!("Backed up {} to {}", path.display(), backup.display());
        }

        let bytes = encode_quantity(value);
        if self.atomic_writes {
            write_atomic(path, offsets, bytes)?;
        } else {
            write_in_place(path, offsets, bytes)?;
        }

        tracing::info!(
            "Wrote quantity {} to {} address(es) in {}",
            value,
            offsets.len(),
            path.display()
        );
        Ok(())
    }

    /// Object count as stored at the lowest quantity address
    pub fn get_object_count<P: AsRef<Path>>(&self, path: P) -> Result<u32> {
        let path = path.as_ref();
        let field = self.inspect(path)?;

        if !field.is_consistent() {
            tracing::warn!(
                "Quantity slots in {} hold different values: {:?}",
                path.display(),
                field.values
            );
        }

        field.primary_value().ok_or_else(|| {
            Error::PatchFailure(format!("No quantity fields found in {}", path.display()))
        })
    }

    /// Parse `text` as an object count and write it to every quantity address
    pub fn set_object_count<P: AsRef<Path>>(&self, path: P, text: &str) -> Result<u16> {
        let count = parse_object_count(text)?;
        let path = path.as_ref();

        let offsets = self.find_addresses(path)?;
        if offsets.is_empty() {
            return Err(Error::PatchFailure(format!(
                "No quantity fields found in {}",
                path.display()
            )));
        }

        self.write_quantity(path, &offsets, count)?;
        Ok(count)
    }
}

/// Accepts base-10 integers in `1..=65535`
pub fn parse_object_count(text: &str) -> Result<u16> {
    let value: i64 = text
        .trim()
        .parse()
        .map_err(|_| Error::Other(format!("Invalid object count '{}'", text.trim())))?;

    if !(1..=i64::from(MAX_OBJECT_COUNT)).contains(&value) {
        return Err(Error::Other(format!(
            "Object count must be between 1 and {}",
            MAX_OBJECT_COUNT
        )));
    }

    u16::try_from(value).map_err(|_| Error::Other(format!("Invalid object count '{}'", value)))
}

/// End of the slot starting at `offset`, or `None` past `usize::MAX`
fn slot_end(offset: usize) -> Option<usize> {
    offset.checked_add(QUANTITY_WIDTH)
}

fn read_target(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(Error::NotFound(format!("File not found: {}", path.display())));
    }
    Ok(fs::read(path)?)
}

// Not transactional: a failure partway leaves earlier addresses patched.
fn write_in_place(path: &Path, offsets: &[usize], bytes: [u8; QUANTITY_WIDTH]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;

    for (written, &offset) in offsets.iter().enumerate() {
        let result = file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| file.write_all(&bytes));

        if let Err(e) = result {
            return Err(Error::PatchFailure(format!(
                "Write to offset {} failed after {} of {} addresses; {} may be inconsistent: {}",
                offset,
                written,
                offsets.len(),
                path.display(),
                e
            )));
        }
    }

    file.flush()?;
    Ok(())
}

fn write_atomic(path: &Path, offsets: &[usize], bytes: [u8; QUANTITY_WIDTH]) -> Result<()> {
    let mut content = fs::read(path)?;
    for &offset in offsets {
        let slot = slot_end(offset)
            .and_then(|end| content.get_mut(offset..end))
            .ok_or_else(|| {
                Error::PatchFailure(format!(
                    "Offset {} is outside {}",
                    offset,
                    path.display()
                ))
            })?;
        slot.copy_from_slice(&bytes);
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(&content)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| {
        Error::PatchFailure(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}
