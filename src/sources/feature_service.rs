//! Paginated ArcGIS REST feature service queries.

use geo::Geometry;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{RawRow, RawTable, RequestDescriptor};
use crate::error::FetchError;
use crate::normalize::Crs;

/// Fixed query parameters sent with every page request.
///
/// Geometry comes back as GeoJSON in WGS84 (`outSR` 4326).
const QUERY_PARAMS: &[(&str, &str)] = &[
    ("where", "1=1"),
    ("geometryType", "esriGeometryPolygon"),
    ("spatialRel", "esriSpatialRelIntersects"),
    ("returnGeometry", "true"),
    ("returnTrueCurves", "false"),
    ("returnIdsOnly", "false"),
    ("returnCountOnly", "false"),
    ("returnZ", "false"),
    ("returnM", "false"),
    ("outSR", "4326"),
    ("returnDistinctValues", "false"),
    ("returnExtentOnly", "false"),
    ("sqlFormat", "none"),
    ("featureEncoding", "esriDefault"),
    ("returnExceededLimitFeatures", "true"),
    ("f", "geojson"),
];

#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    features: Vec<geojson::Feature>,
    properties: Option<PageProperties>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PageProperties {
    #[serde(rename = "exceededTransferLimit")]
    exceeded_transfer_limit: Option<bool>,
}

/// Build the request URL for the page starting at `offset`.
pub fn page_url(descriptor: &RequestDescriptor, offset: usize) -> Url {
    let out_fields = descriptor.field_map().sources().collect::<Vec<_>>().join(",");
    let mut url = descriptor.source_url().clone();
    url.query_pairs_mut()
        .extend_pairs(QUERY_PARAMS)
        .append_pair("outFields", &out_fields)
        .append_pair("resultOffset", &offset.to_string());
    url
}

/// Fetch every page of a feature service layer.
///
/// Pages are requested while the server flags `exceededTransferLimit`, each
/// at the offset of the rows received so far. A query error reported in the
/// payload aborts the layer.
pub async fn fetch(client: &Client, descriptor: &RequestDescriptor) -> Result<RawTable, FetchError> {
    let mut table = RawTable::new(Crs::WGS84);
    let mut offset = 0usize;
    let mut pages = 0usize;

    loop {
        let url = page_url(descriptor, offset);
        debug!("Requesting {} at offset {}", descriptor.layer_name(), offset);

        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Server(format!(
                "HTTP {} from {}",
                status,
                descriptor.source_url()
            )));
        }

        let body = response.bytes().await?;
        let page: QueryPage = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Server(format!("malformed response: {}", e)))?;

        if let Some(error) = page.error {
            return Err(FetchError::Server(format!("could not process query: {}", error)));
        }

        let received = page.features.len();
        let more = page
            .properties
            .and_then(|p| p.exceeded_transfer_limit)
            .unwrap_or(false);

        for feature in page.features {
            table.push(feature_to_row(feature)?);
        }
        pages += 1;
        offset += received;

        if !more {
            break;
        }
        if received == 0 {
            return Err(FetchError::Server(
                "transfer limit exceeded on an empty page".to_string(),
            ));
        }
    }

    info!(
        "Fetched {} features for {} in {} page(s)",
        table.len(),
        descriptor.layer_name(),
        pages
    );
    Ok(table)
}

fn feature_to_row(feature: geojson::Feature) -> Result<RawRow, FetchError> {
    let geometry = feature
        .geometry
        .map(Geometry::<f64>::try_from)
        .transpose()
        .map_err(|e| FetchError::Server(format!("malformed geometry: {}", e)))?;
    Ok(RawRow {
        geometry,
        properties: feature.properties.unwrap_or_default(),
    })
}
