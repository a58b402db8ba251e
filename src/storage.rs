use opendal::services::S3;
use opendal::Operator;
use std::env;
use std::time::Duration;

/// Presigned read URLs last a week, the longest most S3-compatible stores
/// allow. Set PUBLIC_OBJECT_URL_BASE for a bucket served publicly instead.
const READ_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub fn init_operator() -> anyhow::Result<Operator> {
    let endpoint = env::var("OBJECT_STORAGE_ENDPOINT")
        .map_err(|_| anyhow::anyhow!("OBJECT_STORAGE_ENDPOINT must be set"))?;
    let bucket = env::var("OBJECT_STORAGE_BUCKET")
        .map_err(|_| anyhow::anyhow!("OBJECT_STORAGE_BUCKET must be set"))?;
    let region = env::var("OBJECT_STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let access_key = env::var("OBJECT_ACCESS_KEY_ID")
        .map_err(|_| anyhow::anyhow!("OBJECT_ACCESS_KEY_ID must be set"))?;
    let secret_key = env::var("OBJECT_SECRET_ACCESS_KEY")
        .map_err(|_| anyhow::anyhow!("OBJECT_SECRET_ACCESS_KEY must be set"))?;

    let op = Operator::new(
        S3::default()
            .endpoint(&endpoint)
            .bucket(&bucket)
            .region(&region)
            .access_key_id(&access_key)
            .secret_access_key(&secret_key),
    )?
    .finish();

    Ok(op)
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Writes the image under a key namespaced by donor id plus a time-based
/// uniqueness token, then resolves a retrievable URL. Failures propagate;
/// the enclosing donation-creation action aborts with them.
pub async fn upload_donation_image(
    op: &Operator,
    donor_id: &str,
    file_name: &str,
    content_type: &str,
    bytes: Vec<u8>,
) -> anyhow::Result<String> {
    let key = format!(
        "donations/{}/{}-{}",
        donor_id,
        chrono::Utc::now().timestamp_millis(),
        sanitize_file_name(file_name)
    );

    op.write_with(&key, bytes)
        .content_type(content_type)
        .await?;

    if let Ok(base) = env::var("PUBLIC_OBJECT_URL_BASE") {
        return Ok(format!("{}/{}", base.trim_end_matches('/'), key));
    }

    let presigned = op.presign_read(&key, READ_URL_TTL).await?;
    Ok(presigned.uri().to_string())
}

#[cfg(test)]
mod tests {
    use super::sanitize_file_name;

    #[test]
    fn sanitizes_unsafe_names() {
        assert_eq!(sanitize_file_name("dinner tray.jpg"), "dinner_tray.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name(""), "upload");
    }
}
