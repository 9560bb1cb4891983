use reqwest::{multipart, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use shared::{
    domain::{CategoryId, CategoryRecord, ImageRecord, StoreTypeRecord},
    error::{ApiError, CatalogError, ErrorCode},
    protocol::{CategoryPatch, ListPage, NewCategory},
};

/// Relations resolved on every category read.
pub const EXPAND_RELATIONS: &str = "image,types";
/// Server-side listing order; ties on `order` fall back to creation time.
pub const DEFAULT_SORT: &str = "order,created";

#[derive(Debug, Clone)]
pub struct RemoteCatalogConfig {
    pub base_url: String,
    pub categories: String,
    pub images: String,
    pub store_types: String,
}

impl RemoteCatalogConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            categories: "categories".to_string(),
            images: "images".to_string(),
            store_types: "storeTypes".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub page: u32,
    pub per_page: u32,
    pub sort: String,
    pub filter: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
            sort: DEFAULT_SORT.to_string(),
            filter: None,
        }
    }
}

/// A fresh image file to store alongside a category.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    id: CategoryId,
}

/// Typed HTTP client for the remote record store.
pub struct RemoteCatalog {
    http: Client,
    config: RemoteCatalogConfig,
}

impl RemoteCatalog {
    pub fn new(config: RemoteCatalogConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &RemoteCatalogConfig {
        &self.config
    }

    fn records_url(&self, collection: &str) -> String {
        format!(
            "{}/api/collections/{collection}/records",
            self.config.base_url
        )
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/api/collections/{collection}/records/{id}",
            self.config.base_url
        )
    }

    pub async fn list_categories(
        &self,
        options: &ListOptions,
    ) -> Result<ListPage<CategoryRecord>, CatalogError> {
        self.list_records(&self.config.categories, options, Some(EXPAND_RELATIONS))
            .await
    }

    pub async fn list_store_types(
        &self,
        options: &ListOptions,
    ) -> Result<ListPage<StoreTypeRecord>, CatalogError> {
        self.list_records(&self.config.store_types, options, None)
            .await
    }

    async fn list_records<T: DeserializeOwned>(
        &self,
        collection: &str,
        options: &ListOptions,
        expand: Option<&str>,
    ) -> Result<ListPage<T>, CatalogError> {
        let mut query: Vec<(&str, String)> = vec![
            ("page", options.page.to_string()),
            ("perPage", options.per_page.to_string()),
            ("sort", options.sort.clone()),
        ];
        if let Some(filter) = &options.filter {
            query.push(("filter", filter.clone()));
        }
        if let Some(expand) = expand {
            query.push(("expand", expand.to_string()));
        }

        let response = self
            .http
            .get(self.records_url(collection))
            .query(&query)
            .send()
            .await
            .map_err(CatalogError::transport)?;
        let response = ensure_success(response, collection, None).await?;
        response.json().await.map_err(CatalogError::transport)
    }

    /// Single read with relations resolved.
    pub async fn get_category(&self, id: &CategoryId) -> Result<CategoryRecord, CatalogError> {
        let response = self
            .http
            .get(self.record_url(&self.config.categories, id.as_str()))
            .query(&[("expand", EXPAND_RELATIONS)])
            .send()
            .await
            .map_err(CatalogError::transport)?;
        let response = ensure_success(response, &self.config.categories, Some(id.as_str())).await?;
        response.json().await.map_err(CatalogError::transport)
    }

    /// Creates a category and returns it fully expanded.
    ///
    /// A supplied file is stored first and takes precedence over any image
    /// id already on the body. If record creation then fails, the uploaded
    /// image is left behind.
    pub async fn create_category(
        &self,
        mut category: NewCategory,
        file: Option<ImageUpload>,
    ) -> Result<CategoryRecord, CatalogError> {
        category.name = category.name.trim().to_string();
        if category.name.is_empty() {
            return Err(CatalogError::validation("category name must not be empty"));
        }

        if let Some(file) = file {
            let image = self.upload_image(file).await?;
            category.image = Some(image.id);
        }

        let response = self
            .http
            .post(self.records_url(&self.config.categories))
            .json(&category)
            .send()
            .await
            .map_err(CatalogError::transport)?;
        let response = ensure_success(response, &self.config.categories, None).await?;
        let created: CreatedRecord = response.json().await.map_err(CatalogError::transport)?;

        self.get_category(&created.id).await
    }

    /// Applies a partial update and returns the record fully expanded.
    ///
    /// A supplied file replaces the image relation entirely; the previous
    /// image resource is not deleted.
    pub async fn update_category(
        &self,
        id: &CategoryId,
        mut patch: CategoryPatch,
        file: Option<ImageUpload>,
    ) -> Result<CategoryRecord, CatalogError> {
        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(CatalogError::validation("category name must not be empty"));
            }
            patch.name = Some(name.to_string());
        }

        if let Some(file) = file {
            let image = self.upload_image(file).await?;
            patch.image = Some(image.id);
        }

        let response = self
            .http
            .patch(self.record_url(&self.config.categories, id.as_str()))
            .json(&patch)
            .send()
            .await
            .map_err(CatalogError::transport)?;
        ensure_success(response, &self.config.categories, Some(id.as_str())).await?;

        self.get_category(id).await
    }

    /// Deletes a category. Not idempotent: deleting an id the store no
    /// longer has surfaces its not-found answer.
    pub async fn remove_category(&self, id: &CategoryId) -> Result<(), CatalogError> {
        let response = self
            .http
            .delete(self.record_url(&self.config.categories, id.as_str()))
            .send()
            .await
            .map_err(CatalogError::transport)?;
        ensure_success(response, &self.config.categories, Some(id.as_str())).await?;
        Ok(())
    }

    /// Stores a file in the image collection and returns the new resource.
    pub async fn upload_image(&self, upload: ImageUpload) -> Result<ImageRecord, CatalogError> {
        let mut part = multipart::Part::bytes(upload.bytes).file_name(upload.filename);
        if let Some(mime_type) = &upload.mime_type {
            part = part.mime_str(mime_type).map_err(|err| {
                CatalogError::validation(format!("invalid mime type '{mime_type}': {err}"))
            })?;
        }
        let form = multipart::Form::new().part("image", part);

        let response = self
            .http
            .post(self.records_url(&self.config.images))
            .multipart(form)
            .send()
            .await
            .map_err(CatalogError::transport)?;
        let response = ensure_success(response, &self.config.images, None).await?;
        response.json().await.map_err(CatalogError::transport)
    }

    /// Display URL for a stored image. Pure string work, no network.
    pub fn file_url(&self, image: &ImageRecord) -> String {
        format!(
            "{}/api/files/{}/{}/{}",
            self.config.base_url, self.config.images, image.id, image.image
        )
    }

    /// Display URL for a category's expanded image, or `""` when there is
    /// nothing to show.
    pub fn image_url(&self, category: &CategoryRecord) -> String {
        category
            .expanded_image()
            .map(|image| self.file_url(image))
            .unwrap_or_default()
    }

    /// Realtime endpoint derived from the base URL.
    pub fn realtime_url(&self) -> Result<String, CatalogError> {
        let base = &self.config.base_url;
        let ws_base = if base.starts_with("https://") {
            base.replacen("https://", "wss://", 1)
        } else if base.starts_with("http://") {
            base.replacen("http://", "ws://", 1)
        } else {
            return Err(CatalogError::validation(
                "base url must start with http:// or https://",
            ));
        };
        Ok(format!("{ws_base}/api/realtime"))
    }
}

async fn ensure_success(
    response: Response,
    collection: &str,
    id: Option<&str>,
) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let wire = response.json::<ApiError>().await.ok();
    Err(match (status, wire) {
        (StatusCode::NOT_FOUND, _) => CatalogError::not_found(collection, id.unwrap_or_default()),
        (StatusCode::BAD_REQUEST, Some(err)) => CatalogError::Validation(err.message),
        (StatusCode::BAD_REQUEST, None) => {
            CatalogError::validation(format!("{collection} request rejected by the store"))
        }
        (_, Some(err)) if err.code == ErrorCode::Validation => CatalogError::Validation(err.message),
        (_, Some(err)) => CatalogError::Transport(format!(
            "{collection} request failed ({status}): {}",
            err.message
        )),
        (_, None) => {
            CatalogError::Transport(format!("{collection} request failed with status {status}"))
        }
    })
}

#[cfg(test)]
mod tests {
    use shared::domain::{CategoryExpand, ImageId};

    use super::*;

    fn catalog() -> RemoteCatalog {
        RemoteCatalog::new(RemoteCatalogConfig::new("http://127.0.0.1:8090/"))
    }

    fn stored_image() -> ImageRecord {
        ImageRecord {
            id: ImageId::new("img123"),
            image: "stored_front.png".to_string(),
            kind: None,
        }
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        assert_eq!(catalog().config().base_url, "http://127.0.0.1:8090");
    }

    #[test]
    fn file_url_points_into_the_image_collection() {
        assert_eq!(
            catalog().file_url(&stored_image()),
            "http://127.0.0.1:8090/api/files/images/img123/stored_front.png"
        );
    }

    #[test]
    fn image_url_uses_the_expanded_image() {
        let record = CategoryRecord {
            id: CategoryId::new("c1"),
            name: "Fridges".to_string(),
            order: 1,
            active: true,
            image: Some(ImageId::new("img123")),
            types: None,
            created: None,
            updated: None,
            expand: Some(CategoryExpand {
                image: Some(stored_image()),
                types: None,
            }),
        };
        assert_eq!(
            catalog().image_url(&record),
            "http://127.0.0.1:8090/api/files/images/img123/stored_front.png"
        );
    }

    #[test]
    fn image_url_is_empty_without_an_expanded_image() {
        let record = CategoryRecord {
            id: CategoryId::new("c1"),
            name: "Fridges".to_string(),
            order: 1,
            active: true,
            image: None,
            types: None,
            created: None,
            updated: None,
            expand: None,
        };
        assert_eq!(catalog().image_url(&record), "");
    }

    #[test]
    fn realtime_url_swaps_the_scheme() {
        assert_eq!(
            catalog().realtime_url().expect("realtime url"),
            "ws://127.0.0.1:8090/api/realtime"
        );

        let secure = RemoteCatalog::new(RemoteCatalogConfig::new("https://shop.example"));
        assert_eq!(
            secure.realtime_url().expect("realtime url"),
            "wss://shop.example/api/realtime"
        );
    }

    #[test]
    fn realtime_url_rejects_other_schemes() {
        let bad = RemoteCatalog::new(RemoteCatalogConfig::new("ftp://shop.example"));
        assert!(matches!(bad.realtime_url(), Err(CatalogError::Validation(_))));
    }
}
