// src/client/playback.rs
//! Static placeholder stream served when tuning fails, so the host always
//! has something to display.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::warn;

use crate::client::types::SeekWhence;

pub struct PlaceholderStream {
    file: File,
    size: i64,
}

impl PlaceholderStream {
    pub fn open(path: &Path) -> Result<Self, String> {
        let file = File::open(path).map_err(|e| format!("open {}: {e}", path.display()))?;
        let size = file
            .metadata()
            .map_err(|e| format!("stat {}: {e}", path.display()))?
            .len() as i64;
        if size == 0 {
            return Err(format!("{} is empty", path.display()));
        }
        Ok(Self { file, size })
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        match self.file.read(buf) {
            Ok(0) => {
                // Loop the clip so playback never starves
                if self.file.seek(SeekFrom::Start(0)).is_ok() {
                    self.file.read(buf).unwrap_or(0)
                } else {
                    0
                }
            }
            Ok(n) => n,
            Err(err) => {
                warn!("placeholder read failed: {err}");
                0
            }
        }
    }

    pub fn seek(&mut self, position: i64, whence: SeekWhence) -> i64 {
        let target = match whence {
            SeekWhence::Set => SeekFrom::Start(position.max(0) as u64),
            SeekWhence::Current => SeekFrom::Current(position),
            SeekWhence::End => SeekFrom::End(position),
        };
        self.file.seek(target).map(|p| p as i64).unwrap_or(-1)
    }

    pub fn size(&self) -> i64 {
        self.size
    }
}
