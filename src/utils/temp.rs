use rand::rngs::OsRng;
use rand::RngCore;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// 128-bit identifier from the OS CSPRNG, hex encoded
pub fn random_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Write `bytes` to a uniquely named file under `dir`.
///
/// The file is deleted when the returned handle is dropped, so every exit
/// path of the caller releases it.
pub fn persist_scoped(dir: &Path, bytes: &[u8], suffix: &str) -> std::io::Result<NamedTempFile> {
    let mut file = Builder::new()
        .prefix(&format!("{}-", random_id()))
        .suffix(suffix)
        .rand_bytes(0)
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}
