//! Tenant-scoped assets: the presentation slide injected into `create`,
//! the logo URL, and the custom CSS URL injected into `join`. Storage is
//! the `BlobStore` seam; size gating on the slide mirrors the inline
//! base64-injection caps the Parameter Policy Engine enforces.

use b3lb_core::canned::{MAX_BASE64_SLIDE_SIZE_IN_POST, MAX_SLIDE_SIZE_IN_POST};
use b3lb_core::error::{B3lbError, Result};
use b3lb_core::model::Asset;
use b3lb_storage::{BlobStore, Store};
use uuid::Uuid;

fn slide_key(tenant_uuid: Uuid) -> String {
    format!("assets/{tenant_uuid}/slide")
}

fn logo_key(tenant_uuid: Uuid) -> String {
    format!("assets/{tenant_uuid}/logo")
}

fn custom_css_key(tenant_uuid: Uuid) -> String {
    format!("assets/{tenant_uuid}/custom.css")
}

pub async fn set_slide(
    store: &Store,
    blob: &dyn BlobStore,
    tenant_uuid: Uuid,
    filename: String,
    mimetype: String,
    data: &[u8],
) -> Result<()> {
    if data.len() > MAX_SLIDE_SIZE_IN_POST {
        return Err(B3lbError::ValidationError(format!(
            "slide exceeds {MAX_SLIDE_SIZE_IN_POST} bytes decoded"
        )));
    }
    let key = slide_key(tenant_uuid);
    blob.put(&key, data).await?;

    let mut asset = store.get_asset(tenant_uuid)?;
    asset.slide_blob_key = Some(key);
    asset.slide_filename = Some(filename);
    asset.slide_mimetype = Some(mimetype);
    store.upsert_asset(&asset)?;
    Ok(())
}

pub async fn set_logo(store: &Store, blob: &dyn BlobStore, tenant_uuid: Uuid, mimetype: String, data: &[u8]) -> Result<()> {
    let key = logo_key(tenant_uuid);
    blob.put(&key, data).await?;

    let mut asset = store.get_asset(tenant_uuid)?;
    asset.logo_blob_key = Some(key);
    asset.logo_mimetype = Some(mimetype);
    store.upsert_asset(&asset)?;
    Ok(())
}

pub async fn set_custom_css(store: &Store, blob: &dyn BlobStore, tenant_uuid: Uuid, css: &str) -> Result<()> {
    let key = custom_css_key(tenant_uuid);
    blob.put(&key, css.as_bytes()).await?;

    let mut asset = store.get_asset(tenant_uuid)?;
    asset.custom_css_blob_key = Some(key);
    store.upsert_asset(&asset)?;
    Ok(())
}

pub fn get_assets(store: &Store, tenant_uuid: Uuid) -> Result<Asset> {
    store.get_asset(tenant_uuid)
}

/// Public URL a tenant's logo is served from, for injection into `create`.
pub fn logo_url(api_base_domain: &str, tenant_slug: &str) -> String {
    format!("https://{api_base_domain}/b3lb/t/{}/logo", tenant_slug.to_lowercase())
}

/// Public URL a tenant's slide is served from, used as the `<document url=...>`
/// reference when the slide is too large to inline as base64.
pub fn slide_url(api_base_domain: &str, tenant_slug: &str) -> String {
    format!("https://{api_base_domain}/b3lb/t/{}/slide", tenant_slug.to_lowercase())
}

/// Public URL a tenant's custom CSS is served from, for `userdata-bbb_custom_style_url`.
pub fn custom_css_url(api_base_domain: &str, tenant_slug: &str) -> String {
    format!("https://{api_base_domain}/b3lb/t/{}/css", tenant_slug.to_lowercase())
}

/// Base64-encodes a slide for inline injection, rejecting if the result
/// would exceed the POST-body cap even though the decoded form fit.
pub fn encode_slide_for_inline_injection(data: &[u8]) -> Result<String> {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    if encoded.len() > MAX_BASE64_SLIDE_SIZE_IN_POST {
        return Err(B3lbError::ValidationError(format!(
            "slide exceeds {MAX_BASE64_SLIDE_SIZE_IN_POST} bytes base64-encoded"
        )));
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use b3lb_storage::LocalBlobStore;

    #[tokio::test]
    async fn set_slide_rejects_oversized_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let blob = LocalBlobStore::new(dir.path().join("blobs"));
        let tenant_uuid = Uuid::new_v4();
        let oversized = vec![0u8; MAX_SLIDE_SIZE_IN_POST + 1];

        let err = set_slide(&store, &blob, tenant_uuid, "slide.pdf".into(), "application/pdf".into(), &oversized)
            .await
            .unwrap_err();
        assert!(matches!(err, B3lbError::ValidationError(_)));
    }

    #[tokio::test]
    async fn set_slide_round_trips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("t.sqlite3")).unwrap();
        let blob = LocalBlobStore::new(dir.path().join("blobs"));
        let tenant_uuid = Uuid::new_v4();

        set_slide(&store, &blob, tenant_uuid, "slide.pdf".into(), "application/pdf".into(), b"pdfdata")
            .await
            .unwrap();

        let asset = get_assets(&store, tenant_uuid).unwrap();
        assert_eq!(asset.slide_filename.as_deref(), Some("slide.pdf"));
        assert!(asset.slide_blob_key.is_some());
    }

    #[test]
    fn inline_injection_rejects_oversized_base64() {
        let data = vec![0u8; MAX_SLIDE_SIZE_IN_POST + 1];
        let err = encode_slide_for_inline_injection(&data).unwrap_err();
        assert!(matches!(err, B3lbError::ValidationError(_)));
    }

    #[test]
    fn inline_injection_accepts_small_payload() {
        let data = b"small slide bytes";
        let encoded = encode_slide_for_inline_injection(data).unwrap();
        assert!(!encoded.is_empty());
    }
}
