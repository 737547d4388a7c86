//! Enrollment store: one embedding per identity, backed by reference images.
//!
//! The backing directory holds one image per identity, named
//! `<identity>.<ext>` with `ext` from [`IMAGE_EXTENSIONS`]. The in-memory
//! mapping is never persisted; [`EnrollmentStore::reload`] rebuilds it from
//! the images.
//!
//! Locking: the mapping sits behind one mutex. Embeddings are computed
//! before the lock is taken; only the final swap or insert holds it.
//! Enrollments hold `write_lock` across the image write and the insert, and
//! reloads hold it from the directory scan through the swap, so disk and
//! memory agree on which write won. Readers only take the mapping mutex.

use crate::error::RosterError;
use image::{ImageFormat, RgbImage};
use rollcall_core::{Embedding, EmbeddingProvider, EncodeOptions, EnrollmentRecord, Identity};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Reference image extensions recognized on reload (case-insensitive).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Outcome of a reload pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReloadReport {
    pub loaded: usize,
    pub skipped: usize,
}

pub struct EnrollmentStore {
    dir: PathBuf,
    options: EncodeOptions,
    records: Mutex<Vec<EnrollmentRecord>>,
    write_lock: Mutex<()>,
}

impl EnrollmentStore {
    /// Create an empty store over `dir`. Nothing is read until [`reload`](Self::reload).
    pub fn new(dir: impl Into<PathBuf>, options: EncodeOptions) -> Self {
        Self {
            dir: dir.into(),
            options,
            records: Mutex::new(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Rebuild the mapping from the reference images on disk.
    ///
    /// Files are processed in filename order. A file that cannot be read,
    /// decoded, or yields no face is skipped with a warning. When two files
    /// share a stem, the later one wins.
    pub fn reload(&self, provider: &mut dyn EmbeddingProvider) -> Result<ReloadReport, RosterError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RosterError::storage(&self.dir, e))?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut fresh: Vec<EnrollmentRecord> = Vec::new();
        let mut skipped = 0;

        for path in reference_images(&self.dir)? {
            let Some(identity) = identity_from_path(&path) else {
                tracing::warn!(path = %path.display(), "file name is not a valid identity; skipping");
                skipped += 1;
                continue;
            };

            match self.embed_file(provider, &path) {
                Ok(embedding) => {
                    tracing::debug!(identity = %identity, path = %path.display(), "loaded face");
                    upsert(&mut fresh, EnrollmentRecord { identity, embedding });
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping reference image");
                    skipped += 1;
                }
            }
        }

        let report = ReloadReport { loaded: fresh.len(), skipped };
        *self.lock() = fresh;

        tracing::info!(
            dir = %self.dir.display(),
            loaded = report.loaded,
            skipped = report.skipped,
            "enrollment store reloaded"
        );
        Ok(report)
    }

    /// Enroll (or re-enroll) `identity` from encoded image bytes.
    ///
    /// When the image holds several faces, the first detection is used.
    /// Nothing is written and the mapping is untouched unless an embedding
    /// was produced.
    pub fn enroll(
        &self,
        provider: &mut dyn EmbeddingProvider,
        identity: &str,
        image: &[u8],
    ) -> Result<Identity, RosterError> {
        let identity = Identity::parse(identity)?;
        let decoded = decode_image(image)?;
        let embedding = first_embedding(provider, &decoded, &self.options)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.write_reference(&identity, image, &decoded)?;

        let replaced = upsert(
            &mut self.lock(),
            EnrollmentRecord { identity: identity.clone(), embedding },
        );
        tracing::info!(
            identity = %identity,
            path = %path.display(),
            replaced,
            "enrolled"
        );
        Ok(identity)
    }

    /// Snapshot of every record, in store order.
    pub fn all(&self) -> Vec<EnrollmentRecord> {
        self.lock().clone()
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.lock().iter().map(|r| r.identity.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EnrollmentRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn embed_file(
        &self,
        provider: &mut dyn EmbeddingProvider,
        path: &Path,
    ) -> Result<Embedding, RosterError> {
        let bytes = std::fs::read(path).map_err(|e| RosterError::storage(path, e))?;
        let decoded = decode_image(&bytes)?;
        first_embedding(provider, &decoded, &self.options)
    }

    /// Write the reference image for `identity`, replacing any earlier one.
    ///
    /// JPEG and PNG uploads are stored byte-for-byte so a reload derives the
    /// same embedding; other formats are re-encoded as PNG.
    fn write_reference(
        &self,
        identity: &Identity,
        original: &[u8],
        decoded: &RgbImage,
    ) -> Result<PathBuf, RosterError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RosterError::storage(&self.dir, e))?;

        let (extension, bytes) = match image::guess_format(original) {
            Ok(ImageFormat::Jpeg) => ("jpg", original.to_vec()),
            Ok(ImageFormat::Png) => ("png", original.to_vec()),
            _ => {
                let mut buf = Vec::new();
                decoded
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                    .map_err(|e| RosterError::storage(&self.dir, std::io::Error::other(e)))?;
                ("png", buf)
            }
        };

        let target = self.dir.join(format!("{identity}.{extension}"));
        let staging = self.dir.join(format!(".{identity}.{extension}.tmp"));

        std::fs::write(&staging, &bytes).map_err(|e| RosterError::storage(&staging, e))?;
        if let Err(e) = std::fs::rename(&staging, &target) {
            let _ = std::fs::remove_file(&staging);
            return Err(RosterError::storage(&target, e));
        }

        remove_stale_siblings(&self.dir, identity, &target);
        Ok(target)
    }
}

/// Drop images for `identity` under another extension than `keep`.
///
/// Failures are logged; the new reference image is already in place.
fn remove_stale_siblings(dir: &Path, identity: &Identity, keep: &Path) {
    let siblings = match reference_images(dir) {
        Ok(paths) => paths,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "could not scan for stale reference images");
            return;
        }
    };
    for sibling in siblings {
        if sibling != keep && identity_from_path(&sibling).as_ref() == Some(identity) {
            if let Err(e) = std::fs::remove_file(&sibling) {
                tracing::warn!(path = %sibling.display(), error = %e, "failed to remove stale reference image");
            }
        }
    }
}

/// Decode encoded image bytes into RGB pixels.
pub(crate) fn decode_image(bytes: &[u8]) -> Result<RgbImage, RosterError> {
    if bytes.is_empty() {
        return Err(RosterError::InvalidInput("image is empty".into()));
    }
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| RosterError::InvalidInput(format!("undecodable image: {e}")))
}

/// Run the provider and keep only the first detected face.
fn first_embedding(
    provider: &mut dyn EmbeddingProvider,
    image: &RgbImage,
    options: &EncodeOptions,
) -> Result<Embedding, RosterError> {
    let faces = provider.detect_and_encode(image, options)?;
    if faces.len() > 1 {
        tracing::debug!(faces = faces.len(), "multiple faces detected; using the first");
    }
    faces
        .into_iter()
        .next()
        .map(|face| face.embedding)
        .ok_or(RosterError::NoFaceDetected)
}

/// Insert or overwrite in place. Returns true when an existing record was replaced.
fn upsert(records: &mut Vec<EnrollmentRecord>, record: EnrollmentRecord) -> bool {
    match records.iter_mut().find(|r| r.identity == record.identity) {
        Some(slot) => {
            *slot = record;
            true
        }
        None => {
            records.push(record);
            false
        }
    }
}

/// The identity named by a file stem. Stems that only parse after trimming
/// do not name an identity.
fn identity_from_path(path: &Path) -> Option<Identity> {
    let stem = path.file_stem()?.to_str()?;
    Identity::parse(stem).ok().filter(|identity| identity.as_str() == stem)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Allow-listed image files directly under `dir`, sorted by file name.
fn reference_images(dir: &Path) -> Result<Vec<PathBuf>, RosterError> {
    let entries = std::fs::read_dir(dir).map_err(|e| RosterError::storage(dir, e))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    paths.sort();
    Ok(paths)
}
