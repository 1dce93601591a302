// API client module: a small blocking HTTP client for the remote catalog
// service. Every operation is exactly one request; nothing is retried.
//
// The importer only talks to the service through the `CatalogApi` trait,
// so tests can swap in an in-memory catalog.

use crate::auth::{acquire_token, Credentials};
use crate::config::Settings;
use crate::error::{ImportError, Result};
use crate::products::{collect_pages, PageFetched, Product, ProductPage};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, ETAG, IF_MATCH};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Operations the importer needs from the catalog service.
pub trait CatalogApi {
    /// Display name of the account. A 403 means the account is not linked
    /// to the developer account and maps to `ImportError::AccessDenied`.
    fn get_account_name(&self, account_id: &str) -> Result<String>;

    /// Create an empty menu and return its id.
    fn create_catalog(&self, account_id: &str, name: &str) -> Result<String>;

    fn create_category(&self, account_id: &str, catalog_id: &str, name: &str) -> Result<String>;

    fn create_subcategory(
        &self,
        account_id: &str,
        catalog_id: &str,
        category_id: &str,
        name: &str,
    ) -> Result<String>;

    /// One page of the product listing, 1-based.
    fn products_page(&self, account_id: &str, page: u32, page_size: u32) -> Result<ProductPage>;

    /// Current concurrency token of a resource.
    fn get_etag(&self, resource_id: &str) -> Result<String>;

    /// Replace the product list of a subcategory. Rejected with
    /// `ImportError::Conflict` when `etag` is stale.
    fn patch_subcategory(&self, subcategory_id: &str, product_ids: &[String], etag: &str) -> Result<()>;

    /// Every product of the account, held in memory.
    fn get_all_products(
        &self,
        account_id: &str,
        page_size: u32,
        on_page: &mut dyn FnMut(&PageFetched),
    ) -> Result<Vec<Product>> {
        collect_pages(
            page_size,
            |page| self.products_page(account_id, page, page_size),
            |progress| on_page(progress),
        )
    }
}

/// Blocking client holding the reqwest client, the base URL of the
/// service and the bearer token for the run.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct Created {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct Account {
    name: String,
}

#[derive(Deserialize)]
struct Versioned {
    #[serde(rename = "_etag", default)]
    etag: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImportError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.api_base_url, Duration::from_secs(settings.timeout_secs))
    }

    /// Obtain the run's bearer token from `credentials`.
    pub fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let token = acquire_token(&self.client, &self.base_url, credentials)?;
        self.set_token(&token);
        Ok(())
    }

    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| ImportError::Config("API client is not authenticated".into()))?;
        let mut headers = HeaderMap::new();
        let val = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ImportError::Config("access token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, val);
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, operation: &str, req: RequestBuilder) -> Result<Response> {
        let res = req.headers(self.auth_headers()?).send()?;
        tracing::debug!(operation, status = %res.status(), "catalog API response");
        Ok(res)
    }

    /// Turn a non-2xx response into a transport error naming the operation.
    fn ensure_success(operation: &str, res: Response) -> Result<Response> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status();
        let txt = res.text().unwrap_or_default();
        Err(ImportError::Transport(format!(
            "{} failed with status {}: {}",
            operation, status, txt
        )))
    }

    fn parse<T: serde::de::DeserializeOwned>(operation: &str, res: Response) -> Result<T> {
        res.json()
            .map_err(|e| ImportError::Transport(format!("parsing {} response: {}", operation, e)))
    }

    fn create(&self, operation: &str, path: &str, body: serde_json::Value) -> Result<String> {
        let res = self.send(operation, self.client.post(self.url(path)).json(&body))?;
        let created: Created = Self::parse(operation, Self::ensure_success(operation, res)?)?;
        Ok(created.id)
    }
}

impl CatalogApi for ApiClient {
    fn get_account_name(&self, account_id: &str) -> Result<String> {
        let operation = "account lookup";
        let res = self.send(
            operation,
            self.client.get(self.url(&format!("/accounts/{}", account_id))),
        )?;
        if res.status() == StatusCode::FORBIDDEN {
            return Err(ImportError::AccessDenied {
                account_id: account_id.to_string(),
            });
        }
        let account: Account = Self::parse(operation, Self::ensure_success(operation, res)?)?;
        Ok(account.name)
    }

    fn create_catalog(&self, account_id: &str, name: &str) -> Result<String> {
        self.create(
            "create catalog",
            &format!("/catalog/accounts/{}/menus", account_id),
            json!({ "name": name }),
        )
    }

    fn create_category(&self, account_id: &str, catalog_id: &str, name: &str) -> Result<String> {
        self.create(
            "create category",
            &format!("/catalog/accounts/{}/categories", account_id),
            json!({ "name": name, "menu": catalog_id }),
        )
    }

    fn create_subcategory(
        &self,
        account_id: &str,
        catalog_id: &str,
        category_id: &str,
        name: &str,
    ) -> Result<String> {
        self.create(
            "create subcategory",
            &format!("/catalog/accounts/{}/subCategories", account_id),
            json!({ "name": name, "menu": catalog_id, "category": category_id }),
        )
    }

    fn products_page(&self, account_id: &str, page: u32, page_size: u32) -> Result<ProductPage> {
        let operation = "product listing";
        tracing::debug!(account_id, page, page_size, "fetching product page");
        let body = json!({
            "page": page,
            "visible": true,
            "max_results": page_size,
            "sort": "-_id",
        });
        let res = self.send(
            operation,
            self.client
                .post(self.url(&format!("/catalog/accounts/{}/items", account_id)))
                .json(&body),
        )?;
        Self::parse(operation, Self::ensure_success(operation, res)?)
    }

    fn get_etag(&self, resource_id: &str) -> Result<String> {
        let operation = "etag lookup";
        let res = self.send(
            operation,
            self.client
                .get(self.url(&format!("/catalog/subCategories/{}", resource_id))),
        )?;
        let res = Self::ensure_success(operation, res)?;
        let header = res
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        let text = res
            .text()
            .map_err(|e| ImportError::Transport(format!("reading {} response: {}", operation, e)))?;
        let document = serde_json::from_str::<Versioned>(&text)
            .ok()
            .and_then(|v| v.etag);
        document.or(header).ok_or_else(|| {
            ImportError::Transport(format!("{} returned no etag for {}", operation, resource_id))
        })
    }

    fn patch_subcategory(&self, subcategory_id: &str, product_ids: &[String], etag: &str) -> Result<()> {
        let operation = "subcategory update";
        let if_match = HeaderValue::from_str(etag)
            .map_err(|_| ImportError::Transport(format!("invalid etag for {}", subcategory_id)))?;
        let res = self.send(
            operation,
            self.client
                .patch(self.url(&format!("/catalog/subCategories/{}", subcategory_id)))
                .header(IF_MATCH, if_match)
                .json(&json!({ "subProducts": product_ids })),
        )?;
        match res.status() {
            StatusCode::PRECONDITION_FAILED | StatusCode::PRECONDITION_REQUIRED => {
                Err(ImportError::Conflict {
                    resource_id: subcategory_id.to_string(),
                })
            }
            _ => Self::ensure_success(operation, res).map(|_| ()),
        }
    }
}
