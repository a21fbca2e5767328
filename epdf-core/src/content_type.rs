use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

/// Resolves the content type of a file among the types some backend claims.
pub trait ContentTypeGuesser: Send + Sync {
    fn guess(&self, path: &Path, candidates: &[&str]) -> Option<String>;
}

impl<F> ContentTypeGuesser for F
where
    F: Fn(&Path, &[&str]) -> Option<String> + Send + Sync,
{
    fn guess(&self, path: &Path, candidates: &[&str]) -> Option<String> {
        self(path, candidates)
    }
}

const SNIFF_LEN: usize = 1024;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
];

const EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
];

/// Sniffs leading bytes, then falls back to the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicContentTypes;

impl MagicContentTypes {
    pub fn sniff(header: &[u8]) -> Option<&'static str> {
        if let Some((_, content_type)) = SIGNATURES
            .iter()
            .find(|(magic, _)| header.starts_with(magic))
        {
            return Some(*content_type);
        }
        // PDF readers accept the header anywhere in the first kilobyte
        header
            .windows(5)
            .any(|window| window == b"%PDF-")
            .then_some("application/pdf")
    }

    pub fn from_extension(path: &Path) -> Option<&'static str> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(candidate, _)| *candidate == extension)
            .map(|(_, content_type)| *content_type)
    }
}

impl ContentTypeGuesser for MagicContentTypes {
    fn guess(&self, path: &Path, candidates: &[&str]) -> Option<String> {
        let accepted = |content_type: &&str| {
            candidates
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(content_type))
        };

        match read_header(path) {
            Ok(header) => {
                if let Some(content_type) = Self::sniff(&header).filter(accepted) {
                    return Some(content_type.to_owned());
                }
            }
            Err(err) => {
                debug!(path = %path.display(), %err, "unable to sniff content type");
                return None;
            }
        }

        Self::from_extension(path)
            .filter(accepted)
            .map(str::to_owned)
    }
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}
