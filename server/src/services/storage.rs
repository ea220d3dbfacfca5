use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// Préfixe public sous lequel les fichiers sont servis.
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Fichier vide")]
    Empty,
    #[error("Fichier trop volumineux ({size} octets, maximum {max})")]
    TooLarge { size: usize, max: usize },
    #[error("Type de fichier non autorisé (images JPEG, PNG, WEBP ou GIF uniquement)")]
    UnsupportedType,
    #[error("Chemin de fichier invalide")]
    InvalidPath,
    #[error("Erreur d'écriture du fichier: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    AnnoncePhoto,
    Avatar,
}

impl UploadKind {
    fn dir(&self) -> &'static str {
        match self {
            UploadKind::AnnoncePhoto => "annonces",
            UploadKind::Avatar => "avatars",
        }
    }
}

/// Stockage des images envoyées sur disque, sous `UPLOAD_DIR`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
    max_size: usize,
}

impl FileStorage {
    pub async fn new(base_path: impl Into<PathBuf>, max_size: usize) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        for kind in [UploadKind::AnnoncePhoto, UploadKind::Avatar] {
            fs::create_dir_all(base_path.join(kind.dir())).await?;
        }
        info!("📁 Stockage des fichiers: {}", base_path.display());
        Ok(Self { base_path, max_size })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Enregistre une image et renvoie son chemin public (`/uploads/annonces/<uuid>.png`).
    pub async fn store_image(
        &self,
        kind: UploadKind,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<String, StorageError> {
        if data.is_empty() {
            return Err(StorageError::Empty);
        }
        if data.len() > self.max_size {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let ext = image_extension(content_type, data).ok_or(StorageError::UnsupportedType)?;
        let name = format!("{}.{}", Uuid::new_v4(), ext);
        let path = self.base_path.join(kind.dir()).join(&name);

        fs::write(&path, data).await?;
        debug!("Fichier enregistré: {} ({} octets)", path.display(), data.len());

        Ok(format!("{}/{}/{}", PUBLIC_PREFIX, kind.dir(), name))
    }

    /// Supprime un fichier à partir de son chemin public; absent = déjà supprimé.
    pub async fn remove(&self, public_path: &str) -> Result<(), StorageError> {
        let path = self.resolve(public_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Fichier supprimé: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Suppression sans échec, pour les nettoyages après une erreur.
    pub async fn remove_quietly(&self, public_path: &str) {
        if let Err(e) = self.remove(public_path).await {
            tracing::warn!("⚠️ Fichier non supprimé {}: {}", public_path, e);
        }
    }

    fn resolve(&self, public_path: &str) -> Result<PathBuf, StorageError> {
        let relative = public_path
            .strip_prefix(PUBLIC_PREFIX)
            .map(|p| p.trim_start_matches('/'))
            .ok_or(StorageError::InvalidPath)?;

        let mut resolved = self.base_path.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(c) => resolved.push(c),
                _ => return Err(StorageError::InvalidPath),
            }
        }
        Ok(resolved)
    }
}

/// Le type annoncé doit correspondre à la signature du contenu.
fn image_extension(content_type: Option<&str>, data: &[u8]) -> Option<&'static str> {
    let sniffed = if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "png"
    } else if data.starts_with(b"GIF8") {
        "gif"
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        "webp"
    } else {
        return None;
    };

    let declared = match content_type? {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => return None,
    };

    (declared == sniffed).then_some(sniffed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    async fn test_storage() -> (FileStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path(), 64).await.unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn test_store_and_remove() {
        let (storage, dir) = test_storage().await;

        let public = storage
            .store_image(UploadKind::AnnoncePhoto, Some("image/png"), PNG)
            .await
            .unwrap();
        assert!(public.starts_with("/uploads/annonces/"));
        assert!(public.ends_with(".png"));

        let on_disk = dir.path().join(public.trim_start_matches("/uploads/"));
        assert!(on_disk.exists());

        storage.remove(&public).await.unwrap();
        assert!(!on_disk.exists());
        // Déjà supprimé: pas d'erreur
        storage.remove(&public).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_bad_uploads() {
        let (storage, _dir) = test_storage().await;

        let err = storage
            .store_image(UploadKind::Avatar, Some("image/png"), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Empty));

        let err = storage
            .store_image(UploadKind::Avatar, Some("image/png"), &[0x89; 100])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { size: 100, max: 64 }));

        let err = storage
            .store_image(UploadKind::Avatar, Some("application/pdf"), PNG)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedType));

        // Type annoncé incohérent avec le contenu
        let err = storage
            .store_image(UploadKind::Avatar, Some("image/jpeg"), PNG)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedType));
    }

    #[tokio::test]
    async fn test_remove_rejects_traversal() {
        let (storage, _dir) = test_storage().await;
        assert!(matches!(
            storage.remove("/uploads/../secret.txt").await,
            Err(StorageError::InvalidPath)
        ));
        assert!(matches!(
            storage.remove("/etc/passwd").await,
            Err(StorageError::InvalidPath)
        ));
    }
}
