//! Wire format of the categories endpoint.

use serde::Deserialize;

use crate::error::FetchError;
use crate::models::Category;

/// `{ "success": bool, "data": [ ... ] }`
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<Vec<WireCategory>>,
}

/// A category as serialized by the endpoint.
///
/// Older payloads carry a single `image` instead of the high/low pair.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCategory {
    id: i64,
    name: String,
    high_res_image: Option<String>,
    low_res_image: Option<String>,
    image: Option<String>,
    #[serde(default)]
    path: String,
}

impl TryFrom<WireCategory> for Category {
    type Error = FetchError;

    fn try_from(wire: WireCategory) -> Result<Self, Self::Error> {
        let high = wire.high_res_image.or_else(|| wire.image.clone());
        let low = wire.low_res_image.or(wire.image);

        match (high, low) {
            (Some(high), Some(low)) => Ok(Category::new(wire.id, wire.name)
                .with_images(high, low)
                .with_path(wire.path)),
            _ => Err(FetchError::Decode(format!(
                "category {} has no image url",
                wire.id
            ))),
        }
    }
}

/// Decodes a response body into categories, in payload order.
pub fn decode_payload(body: &[u8]) -> Result<Vec<Category>, FetchError> {
    let envelope: ResponseEnvelope =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    if !envelope.success {
        return Err(FetchError::NoData);
    }
    let data = envelope.data.ok_or(FetchError::NoData)?;

    data.into_iter().map(Category::try_from).collect()
}
