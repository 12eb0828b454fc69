//! Moves that never replace an existing file
//!
//! The target is claimed atomically (hard link, or a `create_new` copy when
//! links are not available) before the source is removed. An occupied
//! target fails with `AlreadyExists`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;

/// Move `src` to `dst`, failing with `AlreadyExists` if `dst` is taken
///
/// On error `src` is left in place and `dst` is untouched.
pub fn move_no_clobber(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => {}
        Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::NotFound) => {
            return Err(e)
        }
        Err(e) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                error = %e,
                "Hard link unavailable, copying instead"
            );
            copy_into_new(src, dst)?;
        }
    }

    if let Err(e) = fs::remove_file(src) {
        // Undo the claim so exactly one copy remains
        if let Err(undo) = fs::remove_file(dst) {
            tracing::warn!(path = %dst.display(), error = %undo, "Failed to undo partial move");
        }
        return Err(e);
    }
    Ok(())
}

fn copy_into_new(src: &Path, dst: &Path) -> io::Result<()> {
    let mut reader = File::open(src)?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(dst)?;

    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    if let Err(e) = copied {
        drop(writer);
        if let Err(rm) = fs::remove_file(dst) {
            tracing::warn!(path = %dst.display(), error = %rm, "Failed to remove incomplete copy");
        }
        return Err(e);
    }
    Ok(())
}
