use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use lazy_static::lazy_static;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_RANGE, RANGE};
use reqwest::{ClientBuilder, StatusCode, Url};

use objcrypt_core::error::{Error, StorageError, StorageErrorKind};
use objcrypt_core::store::{ByteStream, GetObjectRequest, GetObjectResponse, ObjectStore};

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix of user metadata headers.
const META_PREFIX: &str = "x-amz-meta-";

lazy_static! {
    static ref HEADER_VAL: String = format!("cli,{PKG_VERSION}");
    static ref HEADERS: HeaderMap = {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Objcrypt-Client-Version",
            HeaderValue::from_static(&HEADER_VAL),
        );
        headers
    };
}

/// An [`ObjectStore`] speaking plain HTTP GET to an object storage endpoint.
pub struct HttpStore {
    baseurl: Url,
    path_style: bool,
    client: reqwest::Client,
}

fn transport_error(e: reqwest::Error) -> Error {
    StorageError::new(StorageErrorKind::Other, e.to_string()).into()
}

pub(crate) fn status_error(status: StatusCode, url: &Url) -> Option<StorageError> {
    let kind = match status {
        s if s.is_success() => return None,
        StatusCode::NOT_FOUND => StorageErrorKind::NotFound,
        StatusCode::RANGE_NOT_SATISFIABLE => StorageErrorKind::RangeNotSatisfiable,
        _ => StorageErrorKind::Other,
    };

    Some(StorageError::new(kind, format!("GET {url}: {status}")))
}

pub(crate) fn metadata_from_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(META_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

impl HttpStore {
    /// Create a store for `endpoint`.
    ///
    /// With `path_style` the bucket is the first path segment, otherwise the endpoint addresses
    /// the bucket itself.
    pub fn new(endpoint: &str, path_style: bool) -> Result<Self, crate::util::CliError> {
        let mut baseurl =
            Url::parse(endpoint).map_err(|e| crate::util::CliError::Endpoint(e.to_string()))?;
        if !baseurl.path().ends_with('/') {
            let path = format!("{}/", baseurl.path());
            baseurl.set_path(&path);
        }

        let client = ClientBuilder::new().build()?;

        Ok(HttpStore {
            baseurl,
            path_style,
            client,
        })
    }

    pub(crate) fn object_url(&self, request: &GetObjectRequest) -> Result<Url, Error> {
        let path = if self.path_style {
            format!("{}/{}", request.bucket, request.key)
        } else {
            request.key.clone()
        };

        self.baseurl.join(&path).map_err(|e| {
            StorageError::new(StorageErrorKind::Other, format!("invalid object key: {e}")).into()
        })
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn get_object(
        &self,
        request: &GetObjectRequest,
    ) -> Result<(GetObjectResponse, ByteStream), Error> {
        let url = self.object_url(request)?;

        let mut builder = self.client.get(url.clone()).headers(HEADERS.clone());
        if let Some(range) = &request.range {
            builder = builder.header(RANGE, range);
        }

        let res = builder.send().await.map_err(transport_error)?;

        debug!("GET {url}: {}", res.status());

        if let Some(e) = status_error(res.status(), &url) {
            return Err(e.into());
        }

        let response = GetObjectResponse {
            content_length: res.content_length(),
            content_range: res
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            metadata: metadata_from_headers(res.headers()),
        };

        let body = res
            .bytes_stream()
            .map_ok(|b| b.to_vec())
            .map_err(transport_error)
            .boxed();

        Ok((response, body))
    }
}
