//! Numbered backup rotation.
//!
//! Backups of a live file live in numbered slots `<base>.0 .. <base>.N-1`,
//! oldest first. Rotation makes room to promote the live file into the
//! series while retaining at most `keep` backups.

use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Make room in the numbered slots for one more backup.
///
/// `keep` is the number of backups to retain and must be below `max`, the
/// hard cap on slot indices. The filesystem is reached only through the
/// supplied closures: `exists(slot)`, `remove(slot)` and `rename(from, to)`,
/// where `rename` moves, leaving the source vacant, and is never handed an
/// occupied target or `from == to`.
///
/// Returns the slot the live file should be renamed into, or `None` when
/// `keep == 0` and the live file should not be promoted at all.
pub fn shift(
    keep: usize,
    max: usize,
    mut exists: impl FnMut(usize) -> bool,
    mut remove: impl FnMut(usize) -> io::Result<()>,
    mut rename: impl FnMut(usize, usize) -> io::Result<()>,
) -> io::Result<Option<usize>> {
    assert!(keep < max, "retained backups must stay below the slot cap");
    if keep == 0 {
        for slot in 0..max {
            if exists(slot) {
                remove(slot)?;
            }
        }
        return Ok(None);
    }

    // Ramp-up: while a slot below `keep` is free, the next backup takes it
    // directly and nothing moves.
    for slot in 0..keep {
        if !exists(slot) {
            return Ok(Some(slot));
        }
    }

    // All of 0..keep are occupied. Drop the oldest so the survivors slide
    // down into 0..keep, freeing slot `keep` for the live file. Removing
    // more than one covers a `keep` that shrank between rotations.
    let occupied: Vec<usize> = (0..max).filter(|&slot| exists(slot)).collect();
    let dropped = occupied.len() - keep;
    for &slot in &occupied[..dropped] {
        remove(slot)?;
    }
    // Every target below was vacated by the removes or by an earlier rename,
    // so the target never exists when `rename` runs.
    for (target, &slot) in occupied[dropped..].iter().enumerate() {
        if slot != target {
            rename(slot, target)?;
        }
    }
    Ok(Some(keep))
}

/// Applies [`shift`] to real numbered files next to a live log file.
pub struct LogRotator {
    base: PathBuf,
    keep: usize,
    max: usize,
}

impl LogRotator {
    pub fn new(base: impl Into<PathBuf>, keep: usize, max: usize) -> Self {
        Self {
            base: base.into(),
            keep,
            max,
        }
    }

    /// Path of the numbered backup slot, `<base>.<slot>`.
    fn slot_path(&self, slot: usize) -> PathBuf {
        let mut name = self.base.as_os_str().to_os_string();
        name.push(format!(".{slot}"));
        PathBuf::from(name)
    }

    /// Rotate the live file into the numbered series. A no-op when the live
    /// file does not exist; with `keep == 0` the live file is deleted
    /// instead of promoted.
    pub fn rotate(&self) -> io::Result<()> {
        if !self.base.exists() {
            return Ok(());
        }
        let next_slot = shift(
            self.keep,
            self.max,
            |slot| self.slot_path(slot).exists(),
            |slot| fs::remove_file(self.slot_path(slot)),
            |from, to| fs::rename(self.slot_path(from), self.slot_path(to)),
        )?;
        match next_slot {
            Some(slot) => {
                fs::rename(&self.base, self.slot_path(slot))?;
                debug!(base = %self.base.display(), slot, "rotated log file");
            }
            None => {
                fs::remove_file(&self.base)?;
                debug!(base = %self.base.display(), "removed log file, no backups retained");
            }
        }
        Ok(())
    }
}
