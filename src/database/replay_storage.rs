//! Replay file storage with Zstd compression.
//!
//! Replays are stored as compressed binary files named `{hash}.r` inside a
//! caller-supplied directory. Data is serialized with `bincode` before
//! compression.

use crate::models::replay::ReplayData;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zstd::stream::{decode_all, encode_all};

const COMPRESSION_LEVEL: i32 = 19;

fn invalid_data(context: &str, err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", context, err))
}

/// Path of the replay file for `hash` under `dir`.
pub fn replay_path(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{}.r", hash))
}

/// Compresses `data` into `dir/{hash}.r`, creating `dir` if needed.
pub fn save_replay(dir: &Path, hash: &str, data: &ReplayData) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = replay_path(dir, hash);

    let binary = bincode::serde::encode_to_vec(data, bincode::config::standard())
        .map_err(|e| invalid_data("serialization error", e))?;
    let compressed = encode_all(&binary[..], COMPRESSION_LEVEL)?;

    let mut file = File::create(&path)?;
    file.write_all(&compressed)?;
    log::info!("REPLAY: saved {} inputs to {}", data.inputs.len(), path.display());
    Ok(path)
}

pub fn load_replay(dir: &Path, hash: &str) -> io::Result<ReplayData> {
    load_replay_from_path(&replay_path(dir, hash))
}

/// Decompresses and decodes one replay file.
pub fn load_replay_from_path(path: &Path) -> io::Result<ReplayData> {
    let file = File::open(path)?;
    let binary = decode_all(file)?;
    let (data, _len): (ReplayData, usize) =
        bincode::serde::decode_from_slice(&binary, bincode::config::standard())
            .map_err(|e| invalid_data("deserialization error", e))?;
    Ok(data)
}

pub fn delete_replay(dir: &Path, hash: &str) -> io::Result<()> {
    let path = replay_path(dir, hash);
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub fn replay_exists(dir: &Path, hash: &str) -> bool {
    replay_path(dir, hash).exists()
}

/// Writes the replay as pretty JSON next to the binary file.
pub fn export_json(dir: &Path, hash: &str, data: &ReplayData) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", hash));
    let json = serde_json::to_string_pretty(data).map_err(|e| invalid_data("json error", e))?;
    fs::write(&path, json)?;
    Ok(path)
}
