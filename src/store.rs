use std::fs;
use std::io::Write;
use std::path::Path;

use log::debug;
use tempfile::NamedTempFile;

use crate::error::Error;
use crate::format::quote_value;
use crate::reassemble::{Line, LogicalRecord, records};

/// A scratch copy of the source that `set` and `unset` edit.
///
/// The backing file is deleted when the copy is dropped.
#[derive(Debug)]
pub struct WorkingCopy {
    file: NamedTempFile,
}

impl WorkingCopy {
    pub fn new(content: &str) -> Result<Self, Error> {
        let mut file = tempfile::Builder::new()
            .prefix("json-dotenv-")
            .suffix(".env")
            .tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        debug!("working copy staged at {}", file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn read(&self) -> Result<String, Error> {
        Ok(fs::read_to_string(self.file.path())?)
    }

    /// Replace every record for `key` in place, or append one.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let text = format!("{key}={}", quote_value(value));
        let mut lines = records(&self.read()?);

        let mut replaced = false;
        for line in lines.iter_mut().filter(|line| line.key() == Some(key)) {
            *line = Line::Record(LogicalRecord {
                key: key.to_owned(),
                text: text.clone(),
            });
            replaced = true;
        }
        if !replaced {
            lines.push(Line::Record(LogicalRecord {
                key: key.to_owned(),
                text,
            }));
        }

        self.write_lines(&lines)
    }

    /// Remove every record for `key`. Returns whether one was present.
    pub fn unset(&mut self, key: &str) -> Result<bool, Error> {
        let mut lines = records(&self.read()?);
        let before = lines.len();
        lines.retain(|line| line.key() != Some(key));
        if lines.len() == before {
            return Ok(false);
        }

        self.write_lines(&lines)?;
        Ok(true)
    }

    fn write_lines(&mut self, lines: &[Line]) -> Result<(), Error> {
        let mut content = String::new();
        for line in lines {
            content.push_str(line.text());
            content.push('\n');
        }
        fs::write(self.file.path(), content)?;
        Ok(())
    }
}

/// Atomically replace `path` with `contents`.
///
/// The new content is staged next to the target and renamed over it, so a
/// failure before the rename leaves the original untouched. An existing
/// file's permissions, and on unix its ownership, carry over.
pub fn persist(path: &Path, contents: &str) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let existing = fs::metadata(path).ok();

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(contents.as_bytes())?;
    staged.as_file().sync_all()?;

    if let Some(metadata) = &existing {
        fs::set_permissions(staged.path(), metadata.permissions())?;
        #[cfg(unix)]
        preserve_owner(staged.path(), metadata);
    }

    staged.persist(path).map_err(|err| Error::Io(err.error))?;
    debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn preserve_owner(path: &Path, metadata: &fs::Metadata) {
    use std::os::unix::fs::MetadataExt;

    if let Err(err) = std::os::unix::fs::chown(path, Some(metadata.uid()), Some(metadata.gid())) {
        debug!("could not preserve ownership of {}: {err}", path.display());
    }
}
