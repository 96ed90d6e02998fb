//! Single-attempt HTTP GET executor built on curl.
//!
//! Streams the body to `<dest>.part` and renames to `dest` on success, so a
//! torn transfer never leaves a half-written file at the final path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{TransferError, TransferExecutor};

/// Temporary suffix used while a transfer is in flight.
const TEMP_SUFFIX: &str = ".part";

fn temp_path(dest: &Path) -> PathBuf {
    let mut o = dest.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Blocking GET downloader. Redirects are followed; anything outside the
/// 2xx range, or a stalled connection, counts as an interrupted transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurlExecutor;

impl CurlExecutor {
    pub fn new() -> Self {
        Self
    }

    fn fetch(&self, url: &str, tmp: &Path) -> Result<(), TransferError> {
        let file = fs::File::create(tmp)?;
        let mut writer = file.try_clone()?;

        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(Duration::from_secs(30))?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;

        {
            let mut transfer = easy.transfer();
            transfer.write_function(move |data| {
                match writer.write_all(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        tracing::warn!("transfer write failed: {}", e);
                        Ok(0) // abort transfer
                    }
                }
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(TransferError::HttpStatus(code));
        }

        file.sync_all()?;
        Ok(())
    }
}

impl TransferExecutor for CurlExecutor {
    fn execute(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(dest);
        match self.fetch(url, &tmp) {
            Ok(()) => {
                fs::rename(&tmp, dest)?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("cloned-project/img/logo.png"));
        assert_eq!(p.to_string_lossy(), "cloned-project/img/logo.png.part");
    }
}
