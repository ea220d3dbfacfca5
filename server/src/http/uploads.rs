use crate::http::ApiError;
use axum::body::Bytes;
use axum::extract::Multipart;

pub struct UploadedFile {
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Premier fichier du champ `field_name`; les autres champs sont ignorés.
pub async fn next_file(
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(field_name) {
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await?;
            return Ok(Some(UploadedFile { content_type, data }));
        }
    }
    Ok(None)
}

/// Tous les fichiers du champ `field_name`, au plus `max`.
pub async fn collect_files(
    multipart: &mut Multipart,
    field_name: &str,
    max: usize,
) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(file) = next_file(multipart, field_name).await? {
        if files.len() == max {
            return Err(ApiError::BadRequest(format!(
                "{} fichiers maximum par envoi",
                max
            )));
        }
        files.push(file);
    }
    Ok(files)
}
