use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::schedule::error::{JobError, Result};

const TRANSCRIPT_EXTENSION: &str = "txt";

/// Local filesystem home for uploaded audio and written transcripts.
///
/// Audio for job `ulid` lives at `<root>/<ulid>/<file_name>`; its transcript
/// sits next to it as `<file stem>.txt`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn audio_path(&self, ulid: &str, file_name: &str) -> PathBuf {
        self.root.join(ulid).join(file_name)
    }

    /// Writes uploaded audio to a private `.part` sibling of its final path.
    /// The submission that wins the job row promotes it with [`promote`].
    pub async fn stage_audio(&self, ulid: &str, file_name: &str, audio: &[u8]) -> Result<(PathBuf, PathBuf)> {
        let target = self.audio_path(ulid, file_name);
        let staged = stage(&target, audio).await?;
        info!("Staged {} bytes of audio at {:?}", audio.len(), staged);
        Ok((staged, target))
    }

    /// Cleans up after a submission whose job row was not committed.
    /// `target` is only ours if our staged file was already renamed into it.
    pub async fn discard_audio(&self, staged: &Path, target: &Path) {
        let promoted = matches!(fs::try_exists(staged).await, Ok(false));
        let path = if promoted { target } else { staged };
        if let Err(e) = remove_if_exists(path).await {
            warn!("Failed to discard orphaned audio {:?}: {}", path, e);
        }
        // only succeeds once the directory is empty
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir(dir).await;
        }
    }
}

/// Derives the transcript location for a job: the audio's directory, the
/// original file name's stem, and a `.txt` extension. Falls back to a
/// `.transcript.txt` suffix if that would collide with the audio itself.
pub fn transcript_path_for(file_path: &str, file_name: &str) -> PathBuf {
    let audio = Path::new(file_path);
    let dir = audio.parent().unwrap_or_else(|| Path::new(""));
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("transcript");

    let candidate = dir.join(format!("{}.{}", stem, TRANSCRIPT_EXTENSION));
    if candidate == audio {
        dir.join(format!("{}.transcript.{}", stem, TRANSCRIPT_EXTENSION))
    } else {
        candidate
    }
}

/// Writes the transcript to a unique `.part` sibling of `target`.
pub async fn stage_transcript(target: &Path, transcript: &str) -> Result<PathBuf> {
    stage(target, transcript.as_bytes()).await
}

async fn stage(target: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("blob");
    let staged = target.with_file_name(format!("{}.{}.part", file_name, Uuid::new_v4()));

    if let Some(dir) = staged.parent() {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| JobError::storage(dir, e))?;
    }
    fs::write(&staged, bytes)
        .await
        .map_err(|e| JobError::storage(&staged, e))?;

    Ok(staged)
}

pub async fn promote(staged: PathBuf, target: PathBuf) -> Result<()> {
    fs::rename(&staged, &target)
        .await
        .map_err(|e| JobError::storage(&target, e))
}

pub async fn discard_staged(staged: &Path) {
    if let Err(e) = remove_if_exists(staged).await {
        warn!("Failed to remove staged file {:?}: {}", staged, e);
    }
}

/// Reads a stored file, `None` if it does not exist.
pub async fn read(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(JobError::storage(path, e)),
    }
}

/// Deletes source audio after its transcript was retrieved. Audio that is
/// already gone counts as released.
pub async fn release_audio(path: PathBuf) -> Result<()> {
    remove_if_exists(&path)
        .await
        .map_err(|e| JobError::storage(&path, e))?;
    info!("Released audio {:?}", path);
    Ok(())
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Reduces a client supplied file name to a bare, non-empty file name.
pub fn sanitize_file_name(file_name: &str) -> Option<String> {
    let name = file_name.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_sits_next_to_audio() {
        let path = transcript_path_for("/data/audio/01J/interview.mp3", "interview.mp3");
        assert_eq!(path, PathBuf::from("/data/audio/01J/interview.txt"));
    }

    #[test]
    fn transcript_never_overwrites_audio() {
        let path = transcript_path_for("/data/01J/notes.txt", "notes.txt");
        assert_eq!(path, PathBuf::from("/data/01J/notes.transcript.txt"));
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\music\\a.wav").as_deref(), Some("a.wav"));
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name(".."), None);
    }

    #[tokio::test]
    async fn release_tolerates_missing_audio() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("gone.mp3");
        assert!(release_audio(audio.clone()).await.is_ok());

        tokio::fs::write(&audio, b"abc").await.unwrap();
        release_audio(audio.clone()).await.unwrap();
        assert!(!audio.exists());
    }

    #[tokio::test]
    async fn staged_transcript_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("talk.txt");
        let staged = stage_transcript(&target, "hello").await.unwrap();
        assert!(staged.exists());
        assert!(!target.exists());

        promote(staged.clone(), target.clone()).await.unwrap();
        assert!(!staged.exists());
        assert_eq!(read(&target).await.unwrap().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn discarding_unpromoted_audio_keeps_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let (winner, target) = store.stage_audio("01J", "a.wav", b"winner").await.unwrap();
        let (loser, same_target) = store.stage_audio("01J", "a.wav", b"loser").await.unwrap();
        assert_eq!(target, same_target);
        assert_ne!(winner, loser);

        promote(winner, target.clone()).await.unwrap();
        store.discard_audio(&loser, &target).await;
        assert!(!loser.exists());
        assert_eq!(read(&target).await.unwrap().unwrap(), b"winner");
    }

    #[tokio::test]
    async fn discarding_promoted_audio_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let (staged, target) = store.stage_audio("01J", "a.wav", b"mine").await.unwrap();
        promote(staged.clone(), target.clone()).await.unwrap();
        store.discard_audio(&staged, &target).await;
        assert!(!target.exists());
        assert!(!dir.path().join("01J").exists());
    }
}
