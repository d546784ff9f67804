use sanitize_filename::sanitize;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

fn ascii_skeleton(input: &str) -> String {
    // Transliterate, then anything outside [A-Za-z0-9_-] becomes '_'.
    let s = deunicode::deunicode(input);
    let mut out = String::with_capacity(s.len());
    let mut prev_us = false;
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
            prev_us = false;
        } else if !prev_us {
            out.push('_');
            prev_us = true;
        }
    }
    out.trim_matches('_').to_string()
}

/// Sanitize a filename but preserve the last extension (lowercased).
pub fn sanitize_filename_preserve_ext<S: AsRef<str>>(s: S) -> String {
    let name = s.as_ref().trim();
    if name.is_empty() {
        return "untitled".into();
    }

    let (stem_raw, ext_raw) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    };

    let mut out = ascii_skeleton(&sanitize(stem_raw));
    if out.is_empty() {
        out = "untitled".into();
    }

    let ext_clean: String = deunicode::deunicode(ext_raw)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if !ext_clean.is_empty() {
        out.push('.');
        out.push_str(&ext_clean);
    }

    const MAX_LEN: usize = 180;
    if out.len() > MAX_LEN {
        out[..MAX_LEN].to_string()
    } else {
        out
    }
}

/// File name for a downloaded recording: the URL's last path segment when it
/// carries an extension, else `recording-<id>.mp4`.
pub fn recording_file_name(download_url: &str, recording_id: u64) -> String {
    let from_url = Url::parse(download_url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segs| segs.next_back().map(str::to_string))
            .filter(|seg| seg.contains('.'))
    });
    match from_url {
        Some(seg) => {
            let decoded = urlencoding::decode(&seg)
                .map(|c| c.into_owned())
                .unwrap_or(seg);
            sanitize_filename_preserve_ext(decoded)
        }
        None => format!("recording-{recording_id}.mp4"),
    }
}

/// Pick `dir/name`, appending `_1`, `_2`, ... to the stem if taken.
pub async fn unique_destination(dir: &Path, name: &str) -> io::Result<PathBuf> {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (name, String::new()),
    };
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{n}{ext}"));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

pub async fn atomic_rename(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(src, dest).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_extension_and_transliterates() {
        assert_eq!(
            sanitize_filename_preserve_ext("Sesión con Dr. Pérez.MP4"),
            "Sesion_con_Dr_Perez.mp4"
        );
        assert_eq!(sanitize_filename_preserve_ext("   "), "untitled");
        assert_eq!(sanitize_filename_preserve_ext(".mp4"), "mp4");
    }

    #[test]
    fn file_name_from_signed_url() {
        let url = "https://bucket.s3.amazonaws.com/recordings/RT123%20final.mp4?X-Amz-Signature=abc";
        assert_eq!(recording_file_name(url, 7), "RT123_final.mp4");
    }

    #[test]
    fn file_name_falls_back_to_id() {
        assert_eq!(
            recording_file_name("https://video.example.com/media/RT123", 7),
            "recording-7.mp4"
        );
        assert_eq!(recording_file_name("not a url", 9), "recording-9.mp4");
    }

    #[tokio::test]
    async fn unique_destination_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.mp4"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("a_1.mp4"), b"x").await.unwrap();
        let dest = unique_destination(dir.path(), "a.mp4").await.unwrap();
        assert_eq!(dest, dir.path().join("a_2.mp4"));
    }
}
