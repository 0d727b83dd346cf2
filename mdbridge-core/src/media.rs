// ABOUTME: Saving inbound media payloads to the attachments directory
// ABOUTME: Builds safe, timestamped filenames with an extension derived from the mimetype

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Sanitize a filename to only contain safe characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '-' || *c == '_')
        .collect()
}

/// Filename for a downloaded payload.
///
/// Uses the sender-supplied name when there is one, otherwise the message id,
/// and appends the mimetype's preferred extension if the name lacks one.
pub fn attachment_filename(message_id: &str, name_hint: Option<&str>, mimetype: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let base = name_hint
        .map(sanitize_filename)
        .filter(|name| !name.is_empty() && !name.chars().all(|c| c == '.'))
        .unwrap_or_else(|| sanitize_filename(message_id));
    let has_extension = Path::new(&base).extension().is_some();
    let extension = if has_extension {
        None
    } else {
        mime_guess::get_mime_extensions_str(mimetype).and_then(|exts| exts.first().copied())
    };
    match extension {
        Some(ext) => format!("{}_{}.{}", timestamp, base, ext),
        None => format!("{}_{}", timestamp, base),
    }
}

/// Write downloaded bytes under `dir`, returning the full path
pub async fn save_attachment(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(filename);
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(path = %path.display(), size = data.len(), "Saved attachment");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test.txt"), "test.txt");
        assert_eq!(sanitize_filename("my file.pdf"), "myfile.pdf");
        // Dots are allowed (for extensions), so ../../../ becomes ......
        assert_eq!(sanitize_filename("../../../etc/passwd"), "......etcpasswd");
        assert_eq!(sanitize_filename("image (1).png"), "image1.png");
    }

    #[test]
    fn test_attachment_filename_adds_extension_from_mimetype() {
        let name = attachment_filename("3EB0ABC", None, "image/jpeg");
        assert!(name.contains("_3EB0ABC."));
        assert!(!name.ends_with('.'));
    }

    #[test]
    fn test_attachment_filename_keeps_hint_extension() {
        let name = attachment_filename("ID1", Some("report final.pdf"), "application/pdf");
        assert!(name.ends_with("_reportfinal.pdf"));
    }

    #[test]
    fn test_attachment_filename_rejects_dot_only_hint() {
        let name = attachment_filename("ID2", Some("../.."), "application/octet-stream");
        assert!(name.contains("_ID2"));
    }

    #[tokio::test]
    async fn test_save_attachment_creates_dir() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested").join("attachments");
        let path = save_attachment(&dir, "a.bin", b"abc").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abc");
    }
}
