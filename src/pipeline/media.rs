//! Extracted-media manifest and image reference resolution.
//!
//! pandoc writes `src` attributes that point into its extraction directory
//! (absolute or relative, depending on how it was invoked), while callers'
//! HTML may use other prefixes such as `./images/media/image1.png`. Rather
//! than trusting any one spelling, a reference is matched against the files
//! that actually exist, by the longest run of trailing path segments.
//!
//! pandoc percent-encodes anything outside ASCII in a `src`, and may write
//! `file:` URLs, so references are URL-decoded before matching.

use percent_encoding::percent_decode_str;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

/// Subfolder pandoc extracts into below the media root.
const MEDIA_PREFIX: &str = "media/";

/// One file found below the media root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// `/`-separated path relative to the media root, e.g. `media/image1.png`.
    pub key: String,
    output: String,
}

impl MediaFile {
    fn segments(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.key.split('/')
    }

    /// Path under the document's `images/` folder: the key without pandoc's
    /// leading `media/` segment, unless another file already owns that name.
    pub fn output_name(&self) -> &str {
        &self.output
    }
}

/// Give every file a distinct output name. Files outside `media/` keep
/// their key; the rest drop the prefix and re-add it only on a clash.
fn assign_output_names(files: &mut [MediaFile]) {
    let mut taken: HashSet<String> = files
        .iter()
        .filter(|f| !f.key.starts_with(MEDIA_PREFIX))
        .map(|f| f.key.clone())
        .collect();
    for file in files.iter_mut() {
        let Some(flat) = file.key.strip_prefix(MEDIA_PREFIX) else {
            file.output = file.key.clone();
            continue;
        };
        let mut name = flat.to_string();
        while taken.contains(&name) {
            name = format!("{MEDIA_PREFIX}{name}");
        }
        taken.insert(name.clone());
        file.output = name;
    }
}

/// Every media file a conversion extracted, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaManifest {
    root: PathBuf,
    files: Vec<MediaFile>,
}

impl MediaManifest {
    /// Walk `root`. A missing root yields an empty manifest.
    pub fn scan(root: &Path) -> Self {
        let mut files: Vec<MediaFile> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = e.path().strip_prefix(root).ok()?;
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                Some(MediaFile {
                    path: e.path().to_path_buf(),
                    key,
                    output: String::new(),
                })
            })
            .collect();
        Self::from_files(root, files)
    }

    /// Build a manifest from known files (keys relative to `root`).
    pub fn from_keys(root: &Path, keys: &[&str]) -> Self {
        let mut files: Vec<MediaFile> = keys
            .iter()
            .map(|k| MediaFile {
                path: root.join(k),
                key: k.to_string(),
                output: String::new(),
            })
            .collect();
        Self::from_files(root, files)
    }

    fn from_files(root: &Path, mut files: Vec<MediaFile>) -> Self {
        files.sort_by(|a, b| a.key.cmp(&b.key));
        assign_output_names(&mut files);
        Self {
            root: root.to_path_buf(),
            files,
        }
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Find the file an HTML `src` refers to.
    ///
    /// The file name must match; ties on the number of matching trailing
    /// segments go to the first key in sorted order.
    pub fn resolve(&self, reference: &str) -> Option<&MediaFile> {
        let normalised = self.normalise(reference);
        let wanted: Vec<&str> = normalised
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        if wanted.is_empty() {
            return None;
        }

        let mut best: Option<(usize, &MediaFile)> = None;
        for file in &self.files {
            let common = wanted
                .iter()
                .rev()
                .zip(file.segments().rev())
                .take_while(|(a, b)| *a == b)
                .count();
            if common > 0 && best.map_or(true, |(n, _)| common > n) {
                best = Some((common, file));
            }
        }
        best.map(|(_, f)| f)
    }

    fn normalise(&self, reference: &str) -> String {
        let reference = reference.trim();
        let mut s = file_url_path(reference)
            .unwrap_or_else(|| {
                // Keep the path, drop any query or fragment
                let path = reference
                    .find(['?', '#'])
                    .map_or(reference, |cut| &reference[..cut]);
                percent_decode_str(path).decode_utf8_lossy().into_owned()
            })
            .replace('\\', "/");
        let root = self.root.display().to_string().replace('\\', "/");
        if !root.is_empty() {
            if let Some(rest) = s.strip_prefix(&root) {
                s = rest.to_string();
            }
        }
        s
    }
}

/// The local path of a `file:` URL, decoded.
fn file_url_path(reference: &str) -> Option<String> {
    if !reference.get(..5)?.eq_ignore_ascii_case("file:") {
        return None;
    }
    let path = Url::parse(reference).ok()?.to_file_path().ok()?;
    Some(path.to_string_lossy().into_owned())
}

/// Whether an image `src` points outside the extracted media entirely.
pub fn is_external(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:")
}
